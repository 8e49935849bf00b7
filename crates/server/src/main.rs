use std::{net::SocketAddr, path::Path as FsPath, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    act_by_slug, create_booking, create_review, featured_acts, featured_venues, list_reviews,
    register_provider, search_acts, search_venues, venue_by_slug, ApiContext, AuthConfig,
};
use shared::{
    domain::{Act, ActId, Review, Venue, VenueId},
    error::{ApiError, ErrorCode},
    protocol::{
        ActSearchQuery, BookingAck, BookingRequest, ProviderRegistration, ReviewSubmission,
        TokenResponse, VenueSearchQuery,
    },
};
use storage::Storage;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};
use tracing::{error, info};

mod config;

use config::{load_settings, normalize_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[derive(Debug, Deserialize)]
struct ReviewListQuery {
    act_id: Option<i64>,
    venue_id: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(
            %database_url,
            %err,
            "failed to open SQLite database; verify the path is writable"
        );
        err
    })?;
    if settings.seed_demo && storage.seed_demo_catalog().await? {
        info!("seeded demo catalog");
    }

    let api = ApiContext {
        storage,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret,
            token_ttl_seconds: settings.token_ttl_seconds,
        },
    };
    let state = AppState { api };
    let app = build_router(Arc::new(state), FsPath::new(&settings.static_dir));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, static_dir = %settings.static_dir, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, static_dir: &FsPath) -> Router {
    // Unknown paths fall through to the SPA entry point so client-side
    // routes like /acts/some-slug survive a hard refresh.
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/acts", get(http_search_acts))
        .route("/api/acts/:slug", get(http_act_by_slug))
        .route("/api/venues", get(http_search_venues))
        .route("/api/venues/:slug", get(http_venue_by_slug))
        .route("/api/featured/acts", get(http_featured_acts))
        .route("/api/featured/venues", get(http_featured_venues))
        .route(
            "/api/reviews",
            get(http_list_reviews).post(http_create_review),
        )
        .route("/api/bookings", post(http_create_booking))
        .route("/api/auth/register/provider", post(http_register_provider))
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn http_search_acts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActSearchQuery>,
) -> Result<Json<Vec<Act>>, (StatusCode, Json<ApiError>)> {
    let acts = search_acts(&state.api, &query).await.map_err(error_response)?;
    Ok(Json(acts))
}

async fn http_act_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Act>, (StatusCode, Json<ApiError>)> {
    let act = act_by_slug(&state.api, &slug).await.map_err(error_response)?;
    Ok(Json(act))
}

async fn http_search_venues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VenueSearchQuery>,
) -> Result<Json<Vec<Venue>>, (StatusCode, Json<ApiError>)> {
    let venues = search_venues(&state.api, &query)
        .await
        .map_err(error_response)?;
    Ok(Json(venues))
}

async fn http_venue_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Venue>, (StatusCode, Json<ApiError>)> {
    let venue = venue_by_slug(&state.api, &slug)
        .await
        .map_err(error_response)?;
    Ok(Json(venue))
}

async fn http_featured_acts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Act>>, (StatusCode, Json<ApiError>)> {
    let acts = featured_acts(&state.api).await.map_err(error_response)?;
    Ok(Json(acts))
}

async fn http_featured_venues(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Venue>>, (StatusCode, Json<ApiError>)> {
    let venues = featured_venues(&state.api).await.map_err(error_response)?;
    Ok(Json(venues))
}

async fn http_list_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<Vec<Review>>, (StatusCode, Json<ApiError>)> {
    let reviews = list_reviews(
        &state.api,
        query.act_id.map(ActId),
        query.venue_id.map(VenueId),
    )
    .await
    .map_err(error_response)?;
    Ok(Json(reviews))
}

async fn http_create_review(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<ReviewSubmission>,
) -> Result<Json<Review>, (StatusCode, Json<ApiError>)> {
    let review = create_review(&state.api, &submission)
        .await
        .map_err(error_response)?;
    Ok(Json(review))
}

async fn http_create_booking(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<BookingAck>, (StatusCode, Json<ApiError>)> {
    let ack = create_booking(&state.api, &request)
        .await
        .map_err(error_response)?;
    Ok(Json(ack))
}

async fn http_register_provider(
    State(state): State<Arc<AppState>>,
    Query(registration): Query<ProviderRegistration>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ApiError>)> {
    let token = register_provider(&state.api, &registration)
        .await
        .map_err(error_response)?;
    Ok(Json(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use storage::{NewAct, NewVenue};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        storage
            .insert_act(&NewAct {
                slug: "dj-nova".into(),
                name: "DJ Nova".into(),
                act_type: "DJ".into(),
                location: "Leeds".into(),
                ..NewAct::default()
            })
            .await
            .expect("act");
        storage
            .insert_act(&NewAct {
                slug: "brass-riot".into(),
                name: "Brass Riot".into(),
                act_type: "Band".into(),
                location: "Sheffield".into(),
                ..NewAct::default()
            })
            .await
            .expect("act");
        storage
            .insert_venue(&NewVenue {
                slug: "the-old-mill".into(),
                name: "The Old Mill".into(),
                location: "York".into(),
                ..NewVenue::default()
            })
            .await
            .expect("venue");

        let api = ApiContext {
            storage,
            auth: AuthConfig {
                jwt_secret: "test-secret".into(),
                token_ttl_seconds: 60,
            },
        };
        build_router(
            Arc::new(AppState { api }),
            FsPath::new("./missing-test-dist"),
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn act_search_applies_query_filters() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::get("/api/acts?act_type=DJ")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let acts = body_json(response).await;
        assert_eq!(acts.as_array().expect("array").len(), 1);
        assert_eq!(acts[0]["slug"], "dj-nova");
    }

    #[tokio::test]
    async fn unknown_slug_is_404_with_api_error_body() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::get("/api/acts/unknown-slug")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "not_found");
    }

    #[tokio::test]
    async fn booking_validation_failure_is_400() {
        let app = test_app().await;
        let body = serde_json::json!({
            "customer_name": "",
            "customer_email": "jo@example.com",
            "date": "2026-09-12",
            "act_id": 1
        });
        let response = app
            .oneshot(
                Request::post("/api/bookings")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn booking_round_trip_returns_an_id() {
        let app = test_app().await;
        let body = serde_json::json!({
            "customer_name": "Jo",
            "customer_email": "jo@example.com",
            "date": "2026-09-12",
            "message": "evening set",
            "act_id": 1
        });
        let response = app
            .oneshot(
                Request::post("/api/bookings")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let ack = body_json(response).await;
        assert!(ack["id"].as_i64().expect("id") > 0);
    }

    #[tokio::test]
    async fn review_post_then_list_narrowed_by_act() {
        let app = test_app().await;
        let body = serde_json::json!({
            "author_name": "Jo",
            "rating": 5,
            "comment": "packed the floor",
            "act_id": 1
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/reviews")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/reviews?act_id=1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let reviews = body_json(response).await;
        assert_eq!(reviews.as_array().expect("array").len(), 1);
        assert_eq!(reviews[0]["author_name"], "Jo");
    }

    #[tokio::test]
    async fn provider_registration_issues_bearer_token() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::post(
                    "/api/auth/register/provider?email=band@example.com&password=longenough&display_name=The%20Band",
                )
                .body(Body::empty())
                .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await;
        assert_eq!(token["token_type"], "bearer");
        assert!(!token["access_token"].as_str().expect("token").is_empty());
    }
}
