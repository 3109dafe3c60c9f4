use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::ports::{MatchType, VenueMatcherPort};
use crate::config::QualityConfig;
use crate::domain::{Event, Venue};

const MAX_VENUE_SUGGESTIONS: usize = 5;
const AUTO_ASSIGN_CONFIDENCE: f64 = 90.0;

/// Similarity weight split: title 40%, date 30%, location 20%, start time 10%.
const TITLE_WEIGHT: f64 = 0.4;
const DATE_WEIGHT: f64 = 0.3;
const LOCATION_WEIGHT: f64 = 0.2;
const TIME_WEIGHT: f64 = 0.1;

/// The closed set of issue kinds the analyzer can raise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Event has a free-text location but no venue reference
    MissingVenueId,
    /// Event references a venue that no longer exists
    DanglingVenueRef,
    /// Scanner reported low extraction confidence
    LowScannerConfidence,
    /// Event has no categories
    MissingCategories,
    /// Event has no description
    EmptyDescription,
    /// Event date fails the strict format check
    InvalidDateFormat,
    /// Venue has no coordinates
    VenueMissingCoordinates,
    /// No events reference this venue
    VenueUnused,
    /// Event belongs to a detected duplicate group
    DuplicateEvent,
    /// Two venues share the same normalized name
    DuplicateVenue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueType {
    /// Fixed type-to-severity table.
    pub fn severity(&self) -> IssueSeverity {
        match self {
            IssueType::MissingVenueId => IssueSeverity::High,
            IssueType::DanglingVenueRef => IssueSeverity::Critical,
            IssueType::LowScannerConfidence => IssueSeverity::Medium,
            IssueType::MissingCategories => IssueSeverity::Low,
            IssueType::EmptyDescription => IssueSeverity::Low,
            IssueType::InvalidDateFormat => IssueSeverity::High,
            IssueType::VenueMissingCoordinates => IssueSeverity::Medium,
            IssueType::VenueUnused => IssueSeverity::Low,
            IssueType::DuplicateEvent => IssueSeverity::High,
            IssueType::DuplicateVenue => IssueSeverity::Medium,
        }
    }

    /// Whether an automated fix can be proposed for this kind.
    pub fn auto_fixable(&self) -> bool {
        matches!(self, IssueType::MissingVenueId | IssueType::DuplicateEvent)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Ignored,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueEntity {
    Event(Uuid),
    Venue(Uuid),
}

/// A persistent advisory record. The analyzer only ever creates issues as
/// `Open`; every transition happens through the explicit methods below,
/// driven by administrative tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub id: Uuid,
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub status: IssueStatus,
    pub entity: IssueEntity,
    pub description: String,
    pub auto_fixable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataQualityIssue {
    pub fn new(issue_type: IssueType, entity: IssueEntity, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            issue_type,
            severity: issue_type.severity(),
            status: IssueStatus::Open,
            entity,
            description: description.into(),
            auto_fixable: issue_type.auto_fixable(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_progress(&mut self) {
        self.status = IssueStatus::InProgress;
        self.updated_at = Utc::now();
    }

    pub fn resolve(&mut self) {
        self.status = IssueStatus::Resolved;
        self.updated_at = Utc::now();
    }

    pub fn ignore(&mut self) {
        self.status = IssueStatus::Ignored;
        self.updated_at = Utc::now();
    }
}

/// A cluster of catalog events judged to represent one real-world event.
/// Recomputed fresh on every pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDuplicateGroup {
    pub members: Vec<Uuid>,
    /// Average pairwise similarity with the group anchor, 0 to 100
    pub similarity: f64,
    /// Field names whose literal values differ between members
    pub conflict_fields: Vec<String>,
    /// Member nominated to absorb the others
    pub merge_target: Uuid,
}

/// A candidate venue for an event that only has free-text location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueMatchSuggestion {
    pub event_id: Uuid,
    pub venue_id: Uuid,
    pub venue_name: String,
    /// Match confidence, 0 to 100
    pub confidence: f64,
    pub match_type: MatchType,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BulkActionKind {
    AutoAssignVenues,
    MergeDuplicates,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkActionProposal {
    pub kind: BulkActionKind,
    pub description: String,
    pub affected: usize,
}

/// Output of one full catalog pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub issues: Vec<DataQualityIssue>,
    pub duplicate_groups: Vec<EventDuplicateGroup>,
    pub venue_suggestions: Vec<VenueMatchSuggestion>,
    /// Heuristic issue-density proxy, 0 to 100
    pub health_score: u8,
    pub bulk_actions: Vec<BulkActionProposal>,
    pub analyzed_at: DateTime<Utc>,
}

/// Catalog-wide analyzer: per-entity issues, duplicate grouping, venue-match
/// suggestions and bulk-action proposals. Independent of the fusion pipeline
/// but shares its confidence vocabulary.
pub struct DataQualityAnalyzer {
    config: QualityConfig,
    matcher: Arc<dyn VenueMatcherPort>,
}

impl DataQualityAnalyzer {
    pub fn new(config: QualityConfig, matcher: Arc<dyn VenueMatcherPort>) -> Self {
        Self { config, matcher }
    }

    pub fn analyze(&self, events: &[Event], venues: &[Venue]) -> QualityAnalysis {
        let mut issues = Vec::new();

        for event in events {
            issues.extend(self.assess_event(event, venues));
        }
        for venue in venues {
            issues.extend(self.assess_venue(venue, events));
        }

        let duplicate_groups = self.detect_duplicates(events);
        for group in &duplicate_groups {
            issues.push(DataQualityIssue::new(
                IssueType::DuplicateEvent,
                IssueEntity::Event(group.merge_target),
                format!(
                    "{} events look like the same real-world event ({:.0}% similar)",
                    group.members.len(),
                    group.similarity
                ),
            ));
        }
        issues.extend(self.duplicate_venue_issues(venues));

        let venue_suggestions = self.suggest_venues(events, venues);
        let health_score = health_score(&issues, events.len(), venues.len());
        let bulk_actions = self.propose_bulk_actions(&duplicate_groups, &venue_suggestions);

        info!(
            issues = issues.len(),
            duplicate_groups = duplicate_groups.len(),
            suggestions = venue_suggestions.len(),
            health_score,
            "data quality analysis complete"
        );

        QualityAnalysis {
            issues,
            duplicate_groups,
            venue_suggestions,
            health_score,
            bulk_actions,
            analyzed_at: Utc::now(),
        }
    }

    /// Per-event checks. Each check is independent and an event can raise
    /// several issues at once.
    fn assess_event(&self, event: &Event, venues: &[Venue]) -> Vec<DataQualityIssue> {
        let mut issues = Vec::new();
        let entity = IssueEntity::Event(event.id);

        if event.venue_id.is_none() {
            if let Some(location) = &event.location_text {
                if !location.trim().is_empty() {
                    issues.push(DataQualityIssue::new(
                        IssueType::MissingVenueId,
                        entity,
                        format!("event has location text '{}' but no venue reference", location),
                    ));
                }
            }
        }

        if let Some(venue_id) = event.venue_id {
            if !venues.iter().any(|v| v.id == venue_id) {
                issues.push(DataQualityIssue::new(
                    IssueType::DanglingVenueRef,
                    entity,
                    format!("event references missing venue {}", venue_id),
                ));
            }
        }

        if let Some(confidence) = event.scanner_confidence {
            if confidence < self.config.min_scanner_confidence {
                issues.push(DataQualityIssue::new(
                    IssueType::LowScannerConfidence,
                    entity,
                    format!(
                        "scanner confidence {} below threshold {}",
                        confidence, self.config.min_scanner_confidence
                    ),
                ));
            }
        }

        if event.categories.is_empty() {
            issues.push(DataQualityIssue::new(
                IssueType::MissingCategories,
                entity,
                "event has no categories",
            ));
        }

        if event
            .description
            .as_ref()
            .map(|d| d.trim().is_empty())
            .unwrap_or(true)
        {
            issues.push(DataQualityIssue::new(
                IssueType::EmptyDescription,
                entity,
                "event has no description",
            ));
        }

        if !date_text_is_strict(&event.date_text) {
            issues.push(DataQualityIssue::new(
                IssueType::InvalidDateFormat,
                entity,
                format!("event date '{}' is not a strict YYYY-MM-DD value", event.date_text),
            ));
        }

        issues
    }

    fn assess_venue(&self, venue: &Venue, events: &[Event]) -> Vec<DataQualityIssue> {
        let mut issues = Vec::new();
        let entity = IssueEntity::Venue(venue.id);

        if venue.latitude.is_none() || venue.longitude.is_none() {
            issues.push(DataQualityIssue::new(
                IssueType::VenueMissingCoordinates,
                entity,
                format!("venue '{}' has no coordinates", venue.name),
            ));
        }

        if !events.iter().any(|e| e.venue_id == Some(venue.id)) {
            issues.push(DataQualityIssue::new(
                IssueType::VenueUnused,
                entity,
                format!("no events reference venue '{}'", venue.name),
            ));
        }

        issues
    }

    fn duplicate_venue_issues(&self, venues: &[Venue]) -> Vec<DataQualityIssue> {
        let mut issues = Vec::new();
        let mut seen: Vec<(String, Uuid)> = Vec::new();
        for venue in venues {
            let normalized = venue.name.trim().to_lowercase();
            if let Some((_, first)) = seen.iter().find(|(name, _)| *name == normalized) {
                issues.push(DataQualityIssue::new(
                    IssueType::DuplicateVenue,
                    IssueEntity::Venue(venue.id),
                    format!("venue name '{}' duplicates venue {}", venue.name, first),
                ));
            } else {
                seen.push((normalized, venue.id));
            }
        }
        issues
    }

    /// O(n²) anchored pairwise scan. Events already claimed by a group are
    /// skipped, so the result partitions the catalog.
    fn detect_duplicates(&self, events: &[Event]) -> Vec<EventDuplicateGroup> {
        let mut grouped: HashSet<Uuid> = HashSet::new();
        let mut groups = Vec::new();

        for (i, anchor) in events.iter().enumerate() {
            if grouped.contains(&anchor.id) {
                continue;
            }

            let mut members = vec![anchor];
            let mut similarities = Vec::new();
            for candidate in events.iter().skip(i + 1) {
                if grouped.contains(&candidate.id) {
                    continue;
                }
                let similarity = event_similarity(anchor, candidate);
                if similarity >= self.config.duplicate_similarity_threshold {
                    members.push(candidate);
                    similarities.push(similarity);
                }
            }

            if members.len() > 1 {
                for member in &members {
                    grouped.insert(member.id);
                }
                let similarity =
                    similarities.iter().sum::<f64>() / similarities.len() as f64;
                // First member wins ties so reruns stay deterministic
                let mut merge_target = members[0].id;
                let mut best_score = event_completeness_score(members[0]);
                for member in members.iter().skip(1) {
                    let score = event_completeness_score(member);
                    if score > best_score {
                        best_score = score;
                        merge_target = member.id;
                    }
                }
                debug!(
                    members = members.len(),
                    similarity, "duplicate group detected"
                );
                groups.push(EventDuplicateGroup {
                    conflict_fields: conflict_fields(&members),
                    members: members.iter().map(|e| e.id).collect(),
                    similarity,
                    merge_target,
                });
            }
        }

        groups
    }

    /// For every event with a free-text location and no venue: one best-match
    /// lookup at the primary threshold, then one per remaining venue at the
    /// secondary threshold; merged, sorted descending, capped at 5.
    fn suggest_venues(&self, events: &[Event], venues: &[Venue]) -> Vec<VenueMatchSuggestion> {
        let mut suggestions = Vec::new();

        for event in events {
            if event.venue_id.is_some() {
                continue;
            }
            let Some(location) = event.location_text.as_deref().filter(|l| !l.trim().is_empty())
            else {
                continue;
            };

            let mut event_suggestions: Vec<VenueMatchSuggestion> = Vec::new();
            let best =
                self.matcher
                    .find_best_match(location, venues, self.config.primary_match_threshold);
            if let (Some(venue_id), Some(venue_name)) = (best.venue_id, best.venue_name.clone()) {
                event_suggestions.push(VenueMatchSuggestion {
                    event_id: event.id,
                    venue_id,
                    venue_name,
                    confidence: best.score,
                    match_type: best.match_type,
                    reason: format!(
                        "best match on {} for '{}'",
                        best.matched_field.as_deref().unwrap_or("name"),
                        location
                    ),
                });
            }

            for venue in venues {
                if event_suggestions.iter().any(|s| s.venue_id == venue.id) {
                    continue;
                }
                let candidate = self.matcher.find_best_match(
                    location,
                    std::slice::from_ref(venue),
                    self.config.secondary_match_threshold,
                );
                if let (Some(venue_id), Some(venue_name)) =
                    (candidate.venue_id, candidate.venue_name.clone())
                {
                    event_suggestions.push(VenueMatchSuggestion {
                        event_id: event.id,
                        venue_id,
                        venue_name,
                        confidence: candidate.score,
                        match_type: candidate.match_type,
                        reason: format!("secondary candidate for '{}'", location),
                    });
                }
            }

            event_suggestions.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            event_suggestions.truncate(MAX_VENUE_SUGGESTIONS);
            suggestions.extend(event_suggestions);
        }

        suggestions
    }

    fn propose_bulk_actions(
        &self,
        groups: &[EventDuplicateGroup],
        suggestions: &[VenueMatchSuggestion],
    ) -> Vec<BulkActionProposal> {
        let mut actions = Vec::new();

        let high_confidence = suggestions
            .iter()
            .filter(|s| s.confidence >= AUTO_ASSIGN_CONFIDENCE)
            .count();
        if high_confidence > 0 {
            actions.push(BulkActionProposal {
                kind: BulkActionKind::AutoAssignVenues,
                description: format!(
                    "auto-assign {} venue matches at ≥{:.0}% confidence",
                    high_confidence, AUTO_ASSIGN_CONFIDENCE
                ),
                affected: high_confidence,
            });
        }

        if !groups.is_empty() {
            let affected: usize = groups.iter().map(|g| g.members.len()).sum();
            actions.push(BulkActionProposal {
                kind: BulkActionKind::MergeDuplicates,
                description: format!(
                    "merge {} duplicate groups covering {} events",
                    groups.len(),
                    affected
                ),
                affected,
            });
        }

        actions
    }
}

/// Strict date check: the raw scanned value must be a real YYYY-MM-DD date.
fn date_text_is_strict(date_text: &str) -> bool {
    let trimmed = date_text.trim();
    trimmed.len() == 10
        && chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
}

/// Case-insensitive Levenshtein-derived similarity: 100×(maxLen−dist)/maxLen.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100.0;
    }
    let distance = strsim::levenshtein(&a, &b);
    100.0 * (max_len.saturating_sub(distance)) as f64 / max_len as f64
}

/// Weighted pairwise similarity between two catalog events. Symmetric.
pub fn event_similarity(a: &Event, b: &Event) -> f64 {
    let title = title_similarity(&a.title, &b.title);

    let date = match (a.event_day, b.event_day) {
        (Some(da), Some(db)) if da == db => 100.0,
        (Some(_), Some(_)) => 0.0,
        _ => {
            if !a.date_text.trim().is_empty() && a.date_text.trim() == b.date_text.trim() {
                100.0
            } else {
                0.0
            }
        }
    };

    let location = match (a.venue_id, b.venue_id) {
        (Some(va), Some(vb)) => {
            if va == vb {
                100.0
            } else {
                0.0
            }
        }
        _ => match (a.location_text.as_deref(), b.location_text.as_deref()) {
            (Some(la), Some(lb)) => title_similarity(la, lb),
            _ => 0.0,
        },
    };

    let time = match (a.start_time, b.start_time) {
        (Some(ta), Some(tb)) if ta == tb => 100.0,
        _ => 0.0,
    };

    TITLE_WEIGHT * title + DATE_WEIGHT * date + LOCATION_WEIGHT * location + TIME_WEIGHT * time
}

/// Completeness score used to nominate a merge target.
fn event_completeness_score(event: &Event) -> u32 {
    let mut score = 0;
    if event.venue_id.is_some() {
        score += 25;
    }
    if event
        .description
        .as_ref()
        .map(|d| !d.trim().is_empty())
        .unwrap_or(false)
    {
        score += 20;
    }
    if event.start_time.is_some() {
        score += 15;
    }
    if event.end_time.is_some() {
        score += 10;
    }
    if event.website.is_some() {
        score += 10;
    }
    if event.organizer.is_some() {
        score += 10;
    }
    if !event.categories.is_empty() {
        score += 10;
    }
    score
}

/// Literal field differences between group members.
fn conflict_fields(members: &[&Event]) -> Vec<String> {
    let mut fields = Vec::new();
    let first = members[0];

    let mut check = |name: &str, differs: bool| {
        if differs {
            fields.push(name.to_string());
        }
    };

    check("title", members.iter().any(|e| e.title != first.title));
    check(
        "date",
        members.iter().any(|e| e.date_text != first.date_text),
    );
    check(
        "start_time",
        members.iter().any(|e| e.start_time != first.start_time),
    );
    check(
        "location",
        members
            .iter()
            .any(|e| e.location_text != first.location_text || e.venue_id != first.venue_id),
    );
    check(
        "description",
        members.iter().any(|e| e.description != first.description),
    );
    check(
        "organizer",
        members.iter().any(|e| e.organizer != first.organizer),
    );
    check("website", members.iter().any(|e| e.website != first.website));

    fields
}

/// Heuristic issue-density proxy. The constants are part of the contract and
/// must not be recalibrated.
fn health_score(issues: &[DataQualityIssue], event_count: usize, venue_count: usize) -> u8 {
    let capacity = event_count * 5 + venue_count * 2;
    if capacity == 0 {
        return 100;
    }
    let open = issues
        .iter()
        .filter(|i| i.status == IssueStatus::Open)
        .count();
    let score = 100.0 * (1.0 - open as f64 / capacity as f64);
    score.max(0.0).round() as u8
}
