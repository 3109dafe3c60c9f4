use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Event, Venue};

/// Flat field/confidence shape returned by an external vision service.
#[derive(Debug, Clone)]
pub struct VisionExtraction {
    pub fields: HashMap<String, String>,
    pub confidences: HashMap<String, u8>,
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait VisionPort: Send + Sync {
    async fn extract_from_image(&self, bytes: &[u8], mime: &str)
        -> Result<VisionExtraction, String>;
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub content_type: String,
    pub status: u16,
}

#[async_trait]
pub trait WebFetchPort: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<FetchedPage, String>;
}

/// How a venue match was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Partial,
    Fuzzy,
    Keyword,
    None,
}

/// Result of a fuzzy venue lookup.
#[derive(Debug, Clone)]
pub struct VenueMatch {
    pub venue_id: Option<Uuid>,
    pub venue_name: Option<String>,
    /// Match score, 0 to 100
    pub score: f64,
    pub match_type: MatchType,
    /// Which venue attribute the match was made on ("name", "address")
    pub matched_field: Option<String>,
}

impl VenueMatch {
    pub fn none() -> Self {
        Self {
            venue_id: None,
            venue_name: None,
            score: 0.0,
            match_type: MatchType::None,
            matched_field: None,
        }
    }
}

/// Fuzzy venue matcher collaborator. Pure computation, so no async needed.
pub trait VenueMatcherPort: Send + Sync {
    fn find_best_match(&self, location_text: &str, venues: &[Venue], threshold: f64) -> VenueMatch;
}

/// Read-only catalog snapshots for the data-quality analyzer.
#[async_trait]
pub trait CatalogPort: Send + Sync {
    async fn all_events(&self) -> Result<Vec<Event>, String>;
    async fn all_venues(&self) -> Result<Vec<Venue>, String>;
}
