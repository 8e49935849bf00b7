use serde::{Deserialize, Serialize};

use crate::domain::{ActId, BookingId, VenueId};

/// Query parameters for `GET /api/acts`. Empty strings mean "no
/// constraint"; the server treats them as wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActSearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub act_type: String,
    #[serde(default)]
    pub genre: String,
}

/// Query parameters for `GET /api/venues`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub style: String,
}

/// Body of `POST /api/bookings`. Exactly one of `act_id` / `venue_id`
/// identifies the listing being enquired about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_id: Option<ActId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAck {
    pub id: BookingId,
}

/// Body of `POST /api/reviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub author_name: String,
    pub rating: i64,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_id: Option<ActId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
}

/// Query parameters for `POST /api/auth/register/provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
        }
    }
}
