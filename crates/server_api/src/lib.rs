use shared::{
    domain::{Act, ActId, Review, Venue, VenueId},
    error::ApiError,
    protocol::{
        ActSearchQuery, BookingAck, BookingRequest, ProviderRegistration, ReviewSubmission,
        TokenResponse, VenueSearchQuery,
    },
};
use storage::Storage;
use tracing::{error, info};

pub mod auth;

pub use auth::AuthConfig;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}

pub async fn search_acts(ctx: &ApiContext, query: &ActSearchQuery) -> Result<Vec<Act>, ApiError> {
    ctx.storage.search_acts(query).await.map_err(internal)
}

pub async fn act_by_slug(ctx: &ApiContext, slug: &str) -> Result<Act, ApiError> {
    ctx.storage
        .act_by_slug(slug)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("act not found"))
}

pub async fn featured_acts(ctx: &ApiContext) -> Result<Vec<Act>, ApiError> {
    ctx.storage.featured_acts().await.map_err(internal)
}

pub async fn search_venues(
    ctx: &ApiContext,
    query: &VenueSearchQuery,
) -> Result<Vec<Venue>, ApiError> {
    ctx.storage.search_venues(query).await.map_err(internal)
}

pub async fn venue_by_slug(ctx: &ApiContext, slug: &str) -> Result<Venue, ApiError> {
    ctx.storage
        .venue_by_slug(slug)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("venue not found"))
}

pub async fn featured_venues(ctx: &ApiContext) -> Result<Vec<Venue>, ApiError> {
    ctx.storage.featured_venues().await.map_err(internal)
}

pub async fn list_reviews(
    ctx: &ApiContext,
    act_id: Option<ActId>,
    venue_id: Option<VenueId>,
) -> Result<Vec<Review>, ApiError> {
    ctx.storage
        .list_visible_reviews(act_id, venue_id)
        .await
        .map_err(internal)
}

pub async fn create_review(
    ctx: &ApiContext,
    submission: &ReviewSubmission,
) -> Result<Review, ApiError> {
    if submission.author_name.trim().is_empty() {
        return Err(ApiError::validation("author_name is required"));
    }
    if submission.comment.trim().is_empty() {
        return Err(ApiError::validation("comment is required"));
    }
    if !(1..=5).contains(&submission.rating) {
        return Err(ApiError::validation("rating must be between 1 and 5"));
    }
    if submission.act_id.is_none() && submission.venue_id.is_none() {
        return Err(ApiError::validation("review must reference a listing"));
    }

    let id = ctx
        .storage
        .insert_review(submission)
        .await
        .map_err(internal)?;
    Ok(Review {
        id,
        author_name: submission.author_name.clone(),
        rating: submission.rating,
        comment: submission.comment.clone(),
        act_id: submission.act_id,
        venue_id: submission.venue_id,
    })
}

pub async fn create_booking(
    ctx: &ApiContext,
    request: &BookingRequest,
) -> Result<BookingAck, ApiError> {
    if request.customer_name.trim().is_empty() {
        return Err(ApiError::validation("customer_name is required"));
    }
    if request.customer_email.trim().is_empty() || !request.customer_email.contains('@') {
        return Err(ApiError::validation("customer_email is required"));
    }
    if request.date.trim().is_empty() {
        return Err(ApiError::validation("date is required"));
    }
    if request.act_id.is_none() && request.venue_id.is_none() {
        return Err(ApiError::validation("booking must reference a listing"));
    }

    let id = ctx
        .storage
        .insert_booking(request)
        .await
        .map_err(internal)?;
    info!(booking_id = id.0, "booking enquiry stored");
    Ok(BookingAck { id })
}

pub async fn register_provider(
    ctx: &ApiContext,
    registration: &ProviderRegistration,
) -> Result<TokenResponse, ApiError> {
    let email = registration.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    if registration.password.len() < 8 {
        return Err(ApiError::validation(
            "password must be at least 8 characters",
        ));
    }
    if registration.display_name.trim().is_empty() {
        return Err(ApiError::validation("display_name is required"));
    }
    if ctx.storage.email_taken(email).await.map_err(internal)? {
        return Err(ApiError::validation("email is already registered"));
    }

    let password_hash = auth::hash_password(&registration.password);
    let (user_id, provider_id) = ctx
        .storage
        .create_provider(email, &password_hash, registration.display_name.trim())
        .await
        .map_err(internal)?;
    info!(
        user_id = user_id.0,
        provider_id = provider_id.0,
        "provider registered; listing pending approval"
    );

    let token = auth::mint_access_token(&ctx.auth, email)
        .map_err(|err| internal(anyhow::anyhow!("token mint failed: {err}")))?;
    Ok(TokenResponse::bearer(token))
}

fn internal(err: anyhow::Error) -> ApiError {
    error!(%err, "storage operation failed");
    ApiError::internal(err.to_string())
}
