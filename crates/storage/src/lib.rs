use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};

use shared::{
    domain::{Act, ActId, BookingId, ProviderId, Review, ReviewId, UserId, Venue, VenueId},
    protocol::{ActSearchQuery, BookingRequest, ReviewSubmission, VenueSearchQuery},
};

const FEATURED_LIMIT: i64 = 8;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Insert payload for an act; used by seeding and by tests.
#[derive(Debug, Clone, Default)]
pub struct NewAct {
    pub slug: String,
    pub name: String,
    pub act_type: String,
    pub location: String,
    pub price_from: Option<f64>,
    pub rating: Option<f64>,
    pub genres: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub description: Option<String>,
    pub featured: bool,
    pub premium: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewVenue {
    pub slug: String,
    pub name: String,
    pub location: String,
    pub capacity: Option<i64>,
    pub price_from: Option<f64>,
    pub style: Option<String>,
    pub image_url: Option<String>,
    pub amenities: Option<String>,
    pub featured: bool,
    pub premium: bool,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.bootstrap_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn bootstrap_schema(&self) -> Result<()> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                email         TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_provider   INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS providers (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL UNIQUE REFERENCES users(id),
                display_name TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS acts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                slug        TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                act_type    TEXT NOT NULL,
                location    TEXT NOT NULL,
                price_from  REAL,
                rating      REAL,
                genres      TEXT,
                image_url   TEXT,
                video_url   TEXT,
                description TEXT,
                featured    INTEGER NOT NULL DEFAULT 0,
                premium     INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS venues (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                slug       TEXT NOT NULL UNIQUE,
                name       TEXT NOT NULL,
                location   TEXT NOT NULL,
                capacity   INTEGER,
                price_from REAL,
                style      TEXT,
                image_url  TEXT,
                amenities  TEXT,
                featured   INTEGER NOT NULL DEFAULT 0,
                premium    INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_name  TEXT NOT NULL,
                customer_email TEXT NOT NULL,
                date           TEXT NOT NULL,
                message        TEXT,
                act_id         INTEGER REFERENCES acts(id),
                venue_id       INTEGER REFERENCES venues(id),
                created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                author_name TEXT NOT NULL,
                rating      INTEGER NOT NULL,
                comment     TEXT NOT NULL,
                act_id      INTEGER REFERENCES acts(id),
                venue_id    INTEGER REFERENCES venues(id),
                status      TEXT NOT NULL DEFAULT 'visible',
                created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to bootstrap sqlite schema")?;
        }
        Ok(())
    }

    pub async fn insert_act(&self, act: &NewAct) -> Result<ActId> {
        let rec = sqlx::query(
            "INSERT INTO acts (slug, name, act_type, location, price_from, rating, genres,
                               image_url, video_url, description, featured, premium)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&act.slug)
        .bind(&act.name)
        .bind(&act.act_type)
        .bind(&act.location)
        .bind(act.price_from)
        .bind(act.rating)
        .bind(&act.genres)
        .bind(&act.image_url)
        .bind(&act.video_url)
        .bind(&act.description)
        .bind(act.featured)
        .bind(act.premium)
        .fetch_one(&self.pool)
        .await?;
        Ok(ActId(rec.get::<i64, _>(0)))
    }

    pub async fn insert_venue(&self, venue: &NewVenue) -> Result<VenueId> {
        let rec = sqlx::query(
            "INSERT INTO venues (slug, name, location, capacity, price_from, style,
                                 image_url, amenities, featured, premium)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&venue.slug)
        .bind(&venue.name)
        .bind(&venue.location)
        .bind(venue.capacity)
        .bind(venue.price_from)
        .bind(&venue.style)
        .bind(&venue.image_url)
        .bind(&venue.amenities)
        .bind(venue.featured)
        .bind(venue.premium)
        .fetch_one(&self.pool)
        .await?;
        Ok(VenueId(rec.get::<i64, _>(0)))
    }

    /// Server-side filtered act search. Empty parameters are wildcards;
    /// the free-text term matches name, location or genres.
    pub async fn search_acts(&self, query: &ActSearchQuery) -> Result<Vec<Act>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, act_type, location, price_from, rating, genres,
                    image_url, video_url, description, featured, premium
             FROM acts
             WHERE (?1 = '' OR name LIKE '%' || ?1 || '%'
                            OR location LIKE '%' || ?1 || '%'
                            OR IFNULL(genres, '') LIKE '%' || ?1 || '%')
               AND (?2 = '' OR location LIKE '%' || ?2 || '%')
               AND (?3 = '' OR act_type = ?3)
               AND (?4 = '' OR IFNULL(genres, '') LIKE '%' || ?4 || '%')
             ORDER BY premium DESC, featured DESC, id DESC",
        )
        .bind(query.q.trim())
        .bind(query.location.trim())
        .bind(query.act_type.trim())
        .bind(query.genre.trim())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(act_from_row).collect())
    }

    pub async fn act_by_slug(&self, slug: &str) -> Result<Option<Act>> {
        let row = sqlx::query(
            "SELECT id, slug, name, act_type, location, price_from, rating, genres,
                    image_url, video_url, description, featured, premium
             FROM acts WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(act_from_row))
    }

    pub async fn featured_acts(&self) -> Result<Vec<Act>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, act_type, location, price_from, rating, genres,
                    image_url, video_url, description, featured, premium
             FROM acts
             ORDER BY premium DESC, featured DESC, rating IS NULL, rating DESC
             LIMIT ?",
        )
        .bind(FEATURED_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(act_from_row).collect())
    }

    pub async fn search_venues(&self, query: &VenueSearchQuery) -> Result<Vec<Venue>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, location, capacity, price_from, style,
                    image_url, amenities, featured, premium
             FROM venues
             WHERE (?1 = '' OR name LIKE '%' || ?1 || '%'
                            OR location LIKE '%' || ?1 || '%')
               AND (?2 = '' OR location LIKE '%' || ?2 || '%')
               AND (?3 = '' OR IFNULL(style, '') LIKE '%' || ?3 || '%')
             ORDER BY premium DESC, featured DESC, id DESC",
        )
        .bind(query.q.trim())
        .bind(query.location.trim())
        .bind(query.style.trim())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(venue_from_row).collect())
    }

    pub async fn venue_by_slug(&self, slug: &str) -> Result<Option<Venue>> {
        let row = sqlx::query(
            "SELECT id, slug, name, location, capacity, price_from, style,
                    image_url, amenities, featured, premium
             FROM venues WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(venue_from_row))
    }

    pub async fn featured_venues(&self) -> Result<Vec<Venue>> {
        let rows = sqlx::query(
            "SELECT id, slug, name, location, capacity, price_from, style,
                    image_url, amenities, featured, premium
             FROM venues
             ORDER BY premium DESC, featured DESC, price_from IS NULL, price_from ASC
             LIMIT ?",
        )
        .bind(FEATURED_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(venue_from_row).collect())
    }

    /// Visible reviews, newest first. Both narrowing parameters are
    /// optional; the public client fetches the whole collection.
    pub async fn list_visible_reviews(
        &self,
        act_id: Option<ActId>,
        venue_id: Option<VenueId>,
    ) -> Result<Vec<Review>> {
        let rows = sqlx::query(
            "SELECT id, author_name, rating, comment, act_id, venue_id
             FROM reviews
             WHERE status = 'visible'
               AND (?1 IS NULL OR act_id = ?1)
               AND (?2 IS NULL OR venue_id = ?2)
             ORDER BY id DESC",
        )
        .bind(act_id.map(|id| id.0))
        .bind(venue_id.map(|id| id.0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    pub async fn insert_review(&self, review: &ReviewSubmission) -> Result<ReviewId> {
        let rec = sqlx::query(
            "INSERT INTO reviews (author_name, rating, comment, act_id, venue_id, status)
             VALUES (?, ?, ?, ?, ?, 'visible')
             RETURNING id",
        )
        .bind(&review.author_name)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.act_id.map(|id| id.0))
        .bind(review.venue_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(ReviewId(rec.get::<i64, _>(0)))
    }

    pub async fn insert_booking(&self, booking: &BookingRequest) -> Result<BookingId> {
        let rec = sqlx::query(
            "INSERT INTO bookings (customer_name, customer_email, date, message, act_id, venue_id)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&booking.customer_name)
        .bind(&booking.customer_email)
        .bind(&booking.date)
        .bind(&booking.message)
        .bind(booking.act_id.map(|id| id.0))
        .bind(booking.venue_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(BookingId(rec.get::<i64, _>(0)))
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Creates the user and its pending provider profile in one
    /// transaction. Fails on duplicate email.
    pub async fn create_provider(
        &self,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<(UserId, ProviderId)> {
        let mut tx = self.pool.begin().await?;
        let user = sqlx::query(
            "INSERT INTO users (email, password_hash, is_provider) VALUES (?, ?, 1) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;
        let user_id = UserId(user.get::<i64, _>(0));

        let provider = sqlx::query(
            "INSERT INTO providers (user_id, display_name, status) VALUES (?, ?, 'pending')
             RETURNING id",
        )
        .bind(user_id.0)
        .bind(display_name)
        .fetch_one(&mut *tx)
        .await?;
        let provider_id = ProviderId(provider.get::<i64, _>(0));

        tx.commit().await?;
        Ok((user_id, provider_id))
    }

    /// Loads a small demo catalog if the acts table is empty. Returns
    /// whether anything was inserted.
    pub async fn seed_demo_catalog(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM acts")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(false);
        }

        let acts = [
            NewAct {
                slug: "neon-nights-band".into(),
                name: "Neon Nights".into(),
                act_type: "Band".into(),
                location: "Leeds".into(),
                price_from: Some(650.0),
                rating: Some(4.8),
                genres: Some("Pop, Funk".into()),
                featured: true,
                premium: true,
                ..NewAct::default()
            },
            NewAct {
                slug: "dj-solstice".into(),
                name: "DJ Solstice".into(),
                act_type: "DJ".into(),
                location: "Manchester".into(),
                price_from: Some(300.0),
                rating: Some(4.6),
                genres: Some("House, Disco".into()),
                featured: true,
                ..NewAct::default()
            },
            NewAct {
                slug: "the-velvet-keys".into(),
                name: "The Velvet Keys".into(),
                act_type: "Singer".into(),
                location: "York".into(),
                price_from: Some(240.0),
                rating: Some(4.9),
                genres: Some("Jazz, Soul".into()),
                ..NewAct::default()
            },
        ];
        let mut act_ids = Vec::with_capacity(acts.len());
        for act in &acts {
            act_ids.push(self.insert_act(act).await?);
        }

        let venues = [
            NewVenue {
                slug: "the-old-mill".into(),
                name: "The Old Mill".into(),
                location: "Leeds".into(),
                capacity: Some(180),
                price_from: Some(1200.0),
                style: Some("Rustic".into()),
                featured: true,
                premium: true,
                ..NewVenue::default()
            },
            NewVenue {
                slug: "skyline-hall".into(),
                name: "Skyline Hall".into(),
                location: "Manchester".into(),
                capacity: Some(350),
                price_from: Some(2400.0),
                style: Some("Modern".into()),
                featured: true,
                ..NewVenue::default()
            },
        ];
        let mut venue_ids = Vec::with_capacity(venues.len());
        for venue in &venues {
            venue_ids.push(self.insert_venue(venue).await?);
        }

        self.insert_review(&ReviewSubmission {
            author_name: "Hannah P".into(),
            rating: 5,
            comment: "Neon Nights packed the dance floor all night.".into(),
            act_id: act_ids.first().copied(),
            venue_id: None,
        })
        .await?;
        self.insert_review(&ReviewSubmission {
            author_name: "Mark D".into(),
            rating: 4,
            comment: "The Old Mill looked stunning for our reception.".into(),
            act_id: None,
            venue_id: venue_ids.first().copied(),
        })
        .await?;

        Ok(true)
    }
}

fn act_from_row(row: &SqliteRow) -> Act {
    Act {
        id: ActId(row.get("id")),
        slug: row.get("slug"),
        name: row.get("name"),
        act_type: row.get("act_type"),
        location: row.get("location"),
        price_from: row.get("price_from"),
        rating: row.get("rating"),
        genres: row.get("genres"),
        image_url: row.get("image_url"),
        video_url: row.get("video_url"),
        description: row.get("description"),
        featured: row.get("featured"),
        premium: row.get("premium"),
    }
}

fn venue_from_row(row: &SqliteRow) -> Venue {
    Venue {
        id: VenueId(row.get("id")),
        slug: row.get("slug"),
        name: row.get("name"),
        location: row.get("location"),
        capacity: row.get("capacity"),
        price_from: row.get("price_from"),
        style: row.get("style"),
        image_url: row.get("image_url"),
        amenities: row.get("amenities"),
        featured: row.get("featured"),
        premium: row.get("premium"),
    }
}

fn review_from_row(row: &SqliteRow) -> Review {
    Review {
        id: ReviewId(row.get("id")),
        author_name: row.get("author_name"),
        rating: row.get("rating"),
        comment: row.get("comment"),
        act_id: row.get::<Option<i64>, _>("act_id").map(ActId),
        venue_id: row.get::<Option<i64>, _>("venue_id").map(VenueId),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for database url '{database_url}'",
                parent.display()
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
