use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(ActId);
id_newtype!(VenueId);
id_newtype!(ReviewId);
id_newtype!(BookingId);
id_newtype!(ProviderId);

/// Which kind of listing a browse view is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Acts,
    Venues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
    pub id: ActId,
    pub slug: String,
    pub name: String,
    pub act_type: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub slug: String,
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_from: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amenities: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub premium: bool,
}

/// A review is tagged with exactly one of `act_id` / `venue_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub author_name: String,
    pub rating: i64,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_id: Option<ActId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<VenueId>,
}

impl Review {
    pub fn references_act(&self, act_id: ActId) -> bool {
        self.act_id == Some(act_id)
    }

    pub fn references_venue(&self, venue_id: VenueId) -> bool {
        self.venue_id == Some(venue_id)
    }
}
