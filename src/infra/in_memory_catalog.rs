use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::app::ports::CatalogPort;
use crate::domain::{Event, Venue};

/// In-memory catalog store. Snapshot reads for the quality analyzer plus
/// simple insert/remove used by tests and batch tooling.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    events: Arc<Mutex<HashMap<Uuid, Event>>>,
    venues: Arc<Mutex<HashMap<Uuid, Venue>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_event(&self, event: Event) -> Result<(), String> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| "event store lock poisoned".to_string())?;
        events.insert(event.id, event);
        Ok(())
    }

    pub fn insert_venue(&self, venue: Venue) -> Result<(), String> {
        let mut venues = self
            .venues
            .lock()
            .map_err(|_| "venue store lock poisoned".to_string())?;
        venues.insert(venue.id, venue);
        Ok(())
    }

    pub fn remove_event(&self, id: Uuid) -> Result<Option<Event>, String> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| "event store lock poisoned".to_string())?;
        Ok(events.remove(&id))
    }
}

#[async_trait]
impl CatalogPort for InMemoryCatalog {
    async fn all_events(&self) -> Result<Vec<Event>, String> {
        let events = self
            .events
            .lock()
            .map_err(|_| "event store lock poisoned".to_string())?;
        let mut snapshot: Vec<Event> = events.values().cloned().collect();
        snapshot.sort_by_key(|e| e.created_at);
        Ok(snapshot)
    }

    async fn all_venues(&self) -> Result<Vec<Venue>, String> {
        let venues = self
            .venues
            .lock()
            .map_err(|_| "venue store lock poisoned".to_string())?;
        let mut snapshot: Vec<Venue> = venues.values().cloned().collect();
        snapshot.sort_by_key(|v| v.created_at);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(title: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            date_text: "2026-09-01".to_string(),
            event_day: None,
            start_time: None,
            end_time: None,
            location_text: None,
            venue_id: None,
            organizer: None,
            website: None,
            categories: Vec::new(),
            scanner_confidence: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_snapshot() {
        let catalog = InMemoryCatalog::new();
        let e = event("Stored Event");
        catalog.insert_event(e.clone()).unwrap();

        let events = catalog.all_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Stored Event");

        catalog.remove_event(e.id).unwrap();
        assert!(catalog.all_events().await.unwrap().is_empty());
    }
}
