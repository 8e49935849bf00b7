use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use shared::{
    domain::{Act, ListingKind, Venue},
    protocol::{ActSearchQuery, VenueSearchQuery},
};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::{decode_json, ClientError};

/// One filter input on the browse screen. `ActType` and `Genre` only exist
/// for acts, `Style` only for venues; `Text` and `Location` apply to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Text,
    Location,
    ActType,
    Genre,
    Style,
}

impl FilterKey {
    pub fn applies_to(self, kind: ListingKind) -> bool {
        match self {
            FilterKey::Text | FilterKey::Location => true,
            FilterKey::ActType | FilterKey::Genre => kind == ListingKind::Acts,
            FilterKey::Style => kind == ListingKind::Venues,
        }
    }
}

/// Every allowed key is always present; the empty string means "no filter".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    kind: ListingKind,
    text: String,
    location: String,
    act_type: String,
    genre: String,
    style: String,
}

impl FilterState {
    pub fn new(kind: ListingKind) -> Self {
        Self {
            kind,
            text: String::new(),
            location: String::new(),
            act_type: String::new(),
            genre: String::new(),
            style: String::new(),
        }
    }

    pub fn kind(&self) -> ListingKind {
        self.kind
    }

    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) -> Result<(), ClientError> {
        if !key.applies_to(self.kind) {
            return Err(ClientError::Validation(format!(
                "filter {key:?} does not apply to {:?} listings",
                self.kind
            )));
        }
        let value = value.into();
        match key {
            FilterKey::Text => self.text = value,
            FilterKey::Location => self.location = value,
            FilterKey::ActType => self.act_type = value,
            FilterKey::Genre => self.genre = value,
            FilterKey::Style => self.style = value,
        }
        Ok(())
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        if !key.applies_to(self.kind) {
            return None;
        }
        Some(match key {
            FilterKey::Text => &self.text,
            FilterKey::Location => &self.location,
            FilterKey::ActType => &self.act_type,
            FilterKey::Genre => &self.genre,
            FilterKey::Style => &self.style,
        })
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.kind);
    }

    pub(crate) fn act_query(&self) -> ActSearchQuery {
        ActSearchQuery {
            q: self.text.clone(),
            location: self.location.clone(),
            act_type: self.act_type.clone(),
            genre: self.genre.clone(),
        }
    }

    pub(crate) fn venue_query(&self) -> VenueSearchQuery {
        VenueSearchQuery {
            q: self.text.clone(),
            location: self.location.clone(),
            style: self.style.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Listings {
    Acts(Vec<Act>),
    Venues(Vec<Venue>),
}

impl Listings {
    fn empty(kind: ListingKind) -> Self {
        match kind {
            ListingKind::Acts => Listings::Acts(Vec::new()),
            ListingKind::Venues => Listings::Venues(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Listings::Acts(acts) => acts.len(),
            Listings::Venues(venues) => venues.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a single [`ListingBrowser::refresh`] call. A response that
/// arrives after a newer one has already been applied is reported as
/// `Stale` and leaves the visible results untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Applied,
    Stale,
}

#[derive(Debug, Clone)]
pub enum BrowserEvent {
    ResultsUpdated { kind: ListingKind, count: usize },
    LoadingChanged(bool),
    Error(String),
}

struct BrowserState {
    filters: FilterState,
    results: Listings,
    loading: bool,
    applied_seq: u64,
}

/// Browse-and-filter view model for one listing kind.
///
/// Every refresh snapshots the filters and takes a sequence number at issue
/// time. A response is applied only while its sequence number is greater
/// than the last applied one, so out-of-order completions can never
/// overwrite results from a newer request.
pub struct ListingBrowser {
    http: Client,
    server_url: String,
    kind: ListingKind,
    issued: AtomicU64,
    inner: Mutex<BrowserState>,
    events: broadcast::Sender<BrowserEvent>,
}

impl ListingBrowser {
    pub fn new(http: Client, server_url: impl Into<String>, kind: ListingKind) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http,
            server_url: server_url.into(),
            kind,
            issued: AtomicU64::new(0),
            inner: Mutex::new(BrowserState {
                filters: FilterState::new(kind),
                results: Listings::empty(kind),
                loading: false,
                applied_seq: 0,
            }),
            events,
        }
    }

    pub fn kind(&self) -> ListingKind {
        self.kind
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    pub async fn set_filter(
        &self,
        key: FilterKey,
        value: impl Into<String>,
    ) -> Result<(), ClientError> {
        let mut guard = self.inner.lock().await;
        guard.filters.set(key, value)
    }

    pub async fn clear_filters(&self) {
        let mut guard = self.inner.lock().await;
        guard.filters.clear();
    }

    pub async fn filters(&self) -> FilterState {
        self.inner.lock().await.filters.clone()
    }

    pub async fn results(&self) -> Listings {
        self.inner.lock().await.results.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.lock().await.loading
    }

    /// First load after construction: one refresh with whatever the
    /// filters currently are (usually the empty defaults).
    pub async fn activate(&self) -> Result<Refresh, ClientError> {
        self.refresh().await
    }

    /// Fetch listings for the filters as they are right now. Concurrent
    /// calls are safe: whichever request was issued last wins, earlier
    /// completions are discarded as [`Refresh::Stale`]. A failed request
    /// keeps the previously applied results on screen.
    pub async fn refresh(&self) -> Result<Refresh, ClientError> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let filters = {
            let mut guard = self.inner.lock().await;
            if !guard.loading {
                guard.loading = true;
                let _ = self.events.send(BrowserEvent::LoadingChanged(true));
            }
            guard.filters.clone()
        };

        let outcome = match self.kind {
            ListingKind::Acts => self.fetch_acts(&filters.act_query()).await,
            ListingKind::Venues => self.fetch_venues(&filters.venue_query()).await,
        };

        let mut guard = self.inner.lock().await;
        if seq == self.issued.load(Ordering::SeqCst) && guard.loading {
            guard.loading = false;
            let _ = self.events.send(BrowserEvent::LoadingChanged(false));
        }

        if seq <= guard.applied_seq {
            // A newer response already landed; whatever this request
            // produced is out of date.
            if let Err(err) = outcome {
                warn!(kind = ?self.kind, %err, "discarding failure of superseded refresh");
            }
            return Ok(Refresh::Stale);
        }

        match outcome {
            Ok(results) => {
                guard.applied_seq = seq;
                let count = results.len();
                guard.results = results;
                let _ = self.events.send(BrowserEvent::ResultsUpdated {
                    kind: self.kind,
                    count,
                });
                Ok(Refresh::Applied)
            }
            Err(err) => {
                let _ = self.events.send(BrowserEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn fetch_acts(&self, query: &ActSearchQuery) -> Result<Listings, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/acts", self.server_url))
            .query(query)
            .send()
            .await?;
        let acts: Vec<Act> = decode_json(response).await?;
        Ok(Listings::Acts(acts))
    }

    async fn fetch_venues(&self, query: &VenueSearchQuery) -> Result<Listings, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/venues", self.server_url))
            .query(query)
            .send()
            .await?;
        let venues: Vec<Venue> = decode_json(response).await?;
        Ok(Listings::Venues(venues))
    }
}
