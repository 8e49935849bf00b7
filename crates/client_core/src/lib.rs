use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Act, ActId, ListingKind, Review, Venue, VenueId},
    error::ApiError,
    protocol::{BookingAck, BookingRequest, ProviderRegistration, TokenResponse},
};
use tracing::{info, warn};

pub mod browser;
pub mod error;

pub use browser::{BrowserEvent, FilterKey, FilterState, ListingBrowser, Listings, Refresh};
pub use error::ClientError;

/// Where the provider access token lives between requests. The default
/// in-memory store covers CLI and test use; embedders can persist it.
pub trait TokenStore: Send + Sync {
    fn store(&self, token: &str);
    fn access_token(&self) -> Option<String>;
    fn clear(&self);
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    token: std::sync::Mutex<Option<String>>,
}

impl TokenStore for InMemoryTokenStore {
    fn store(&self, token: &str) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.to_string());
        }
    }

    fn access_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActDetail {
    pub act: Act,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueDetail {
    pub venue: Venue,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnquiryTarget {
    Act(ActId),
    Venue(VenueId),
}

/// Booking enquiry form state. Field values survive a failed submission so
/// the user can correct and resend; a successful submission clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnquiryForm {
    pub customer_name: String,
    pub customer_email: String,
    pub date: String,
    pub message: String,
}

impl EnquiryForm {
    pub fn validate(&self) -> Result<(), ClientError> {
        let mut missing = Vec::new();
        if self.customer_name.trim().is_empty() {
            missing.push("customer_name");
        }
        if self.customer_email.trim().is_empty() {
            missing.push("customer_email");
        }
        if self.date.trim().is_empty() {
            missing.push("date");
        }
        if !missing.is_empty() {
            return Err(ClientError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn booking_request(&self, target: EnquiryTarget) -> BookingRequest {
        let message = Some(self.message.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let (act_id, venue_id) = match target {
            EnquiryTarget::Act(id) => (Some(id), None),
            EnquiryTarget::Venue(id) => (None, Some(id)),
        };
        BookingRequest {
            customer_name: self.customer_name.trim().to_string(),
            customer_email: self.customer_email.trim().to_string(),
            date: self.date.trim().to_string(),
            message,
            act_id,
            venue_id,
        }
    }
}

/// Async client for the marketplace API. Browsers created from it share
/// its connection pool and base URL.
pub struct MarketplaceClient {
    http: Client,
    server_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl MarketplaceClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_token_store(server_url, Arc::new(InMemoryTokenStore::default()))
    }

    pub fn with_token_store(server_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            tokens,
        }
    }

    pub fn browser(&self, kind: ListingKind) -> ListingBrowser {
        ListingBrowser::new(self.http.clone(), self.server_url.clone(), kind)
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Loads the act and the review feed concurrently and joins reviews
    /// client-side. A broken review feed degrades to an empty list rather
    /// than failing the whole detail view.
    pub async fn load_act_detail(&self, slug: &str) -> Result<ActDetail, ClientError> {
        let (act, reviews) = tokio::join!(self.fetch_act(slug), self.fetch_reviews());
        let act = act?;
        let reviews = reviews.unwrap_or_else(|err| {
            warn!(slug, %err, "review feed unavailable; showing act without reviews");
            Vec::new()
        });
        let reviews = reviews
            .into_iter()
            .filter(|review| review.references_act(act.id))
            .collect();
        Ok(ActDetail { act, reviews })
    }

    pub async fn load_venue_detail(&self, slug: &str) -> Result<VenueDetail, ClientError> {
        let (venue, reviews) = tokio::join!(self.fetch_venue(slug), self.fetch_reviews());
        let venue = venue?;
        let reviews = reviews.unwrap_or_else(|err| {
            warn!(slug, %err, "review feed unavailable; showing venue without reviews");
            Vec::new()
        });
        let reviews = reviews
            .into_iter()
            .filter(|review| review.references_venue(venue.id))
            .collect();
        Ok(VenueDetail { venue, reviews })
    }

    pub async fn featured_acts(&self) -> Result<Vec<Act>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/featured/acts", self.server_url))
            .send()
            .await?;
        decode_json(response).await
    }

    pub async fn featured_venues(&self) -> Result<Vec<Venue>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/featured/venues", self.server_url))
            .send()
            .await?;
        decode_json(response).await
    }

    /// Validates locally, then issues exactly one POST. The form is cleared
    /// only after the server acknowledges the booking.
    pub async fn submit_enquiry(
        &self,
        form: &mut EnquiryForm,
        target: EnquiryTarget,
    ) -> Result<BookingAck, ClientError> {
        form.validate()?;
        let request = form.booking_request(target);
        let response = self
            .http
            .post(format!("{}/api/bookings", self.server_url))
            .json(&request)
            .send()
            .await?;
        let ack: BookingAck = decode_json(response).await?;
        info!(booking_id = ack.id.0, "enquiry acknowledged");
        form.clear();
        Ok(ack)
    }

    pub async fn register_provider(
        &self,
        registration: &ProviderRegistration,
    ) -> Result<TokenResponse, ClientError> {
        if registration.email.trim().is_empty()
            || registration.password.is_empty()
            || registration.display_name.trim().is_empty()
        {
            return Err(ClientError::Validation(
                "email, password and display_name are required".into(),
            ));
        }
        let response = self
            .http
            .post(format!("{}/api/auth/register/provider", self.server_url))
            .query(&[
                ("email", registration.email.as_str()),
                ("password", registration.password.as_str()),
                ("display_name", registration.display_name.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = decode_json(response).await?;
        self.tokens.store(&token.access_token);
        Ok(token)
    }

    async fn fetch_act(&self, slug: &str) -> Result<Act, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/acts/{slug}", self.server_url))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { slug: slug.into() });
        }
        decode_json(response).await
    }

    async fn fetch_venue(&self, slug: &str) -> Result<Venue, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/venues/{slug}", self.server_url))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { slug: slug.into() });
        }
        decode_json(response).await
    }

    async fn fetch_reviews(&self) -> Result<Vec<Review>, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/reviews", self.server_url))
            .send()
            .await?;
        decode_json(response).await
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if response.status().is_success() {
        return Ok(response.json().await?);
    }
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(api) => Err(ClientError::Api(api)),
        Err(_) => Err(ClientError::Api(ApiError::internal(format!(
            "unexpected status {status}"
        )))),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
