use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{EventRecord, FusableField, SourceType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Missing,
    LowConfidence,
    Partial,
    Good,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    Important,
    NiceToHave,
}

impl Importance {
    fn weight(&self) -> u32 {
        match self {
            Importance::Critical => 3,
            Importance::Important => 2,
            Importance::NiceToHave => 1,
        }
    }
}

/// A field that is missing or below its quality bar, with remediation hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGap {
    pub field: FusableField,
    pub confidence: u8,
    pub status: GapStatus,
    pub importance: Importance,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NeedsWork,
    Minimal,
}

/// A source type worth adding next, scored against the open gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSuggestion {
    pub source_type: SourceType,
    pub score: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum NextAction {
    ReadyToCreate,
    AddSource { field: FusableField, source_type: SourceType },
    ManualEdit { field: FusableField },
    AddAnotherSource,
}

/// Full gap report for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapReport {
    pub gaps: Vec<DataGap>,
    /// Weighted completeness percentage, 0 to 100
    pub completeness: u8,
    pub readiness: Readiness,
    pub source_suggestions: Vec<SourceSuggestion>,
    pub next_action: NextAction,
}

/// Fixed importance and confidence bar for each canonical field.
const FIELD_TABLE: [(FusableField, Importance, u8); 8] = [
    (FusableField::Title, Importance::Critical, 70),
    (FusableField::Date, Importance::Critical, 70),
    (FusableField::Description, Importance::Important, 50),
    (FusableField::Location, Importance::Important, 60),
    (FusableField::TicketInfo, Importance::Important, 50),
    (FusableField::Organizer, Importance::NiceToHave, 50),
    (FusableField::ContactInfo, Importance::NiceToHave, 50),
    (FusableField::Website, Importance::NiceToHave, 50),
];

/// What each source type is good at extracting, scored 0-3. Used to rank
/// which source to add next.
const SOURCE_CAPABILITIES: [(SourceType, [(FusableField, u32); 8]); 3] = [
    (
        SourceType::Text,
        [
            (FusableField::Title, 2),
            (FusableField::Date, 2),
            (FusableField::Description, 3),
            (FusableField::Location, 2),
            (FusableField::Organizer, 2),
            (FusableField::TicketInfo, 2),
            (FusableField::ContactInfo, 2),
            (FusableField::Website, 2),
        ],
    ),
    (
        SourceType::Image,
        [
            (FusableField::Title, 3),
            (FusableField::Date, 3),
            (FusableField::Description, 1),
            (FusableField::Location, 3),
            (FusableField::Organizer, 2),
            (FusableField::TicketInfo, 3),
            (FusableField::ContactInfo, 2),
            (FusableField::Website, 1),
        ],
    ),
    (
        SourceType::Url,
        [
            (FusableField::Title, 3),
            (FusableField::Date, 3),
            (FusableField::Description, 3),
            (FusableField::Location, 2),
            (FusableField::Organizer, 2),
            (FusableField::TicketInfo, 2),
            (FusableField::ContactInfo, 1),
            (FusableField::Website, 3),
        ],
    ),
];

/// Scores record completeness and recommends what to do next. Pure and
/// synchronous.
pub struct GapAnalyzer;

impl GapAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, record: &EventRecord, used_sources: &[SourceType]) -> GapReport {
        let gaps: Vec<DataGap> = FIELD_TABLE
            .iter()
            .map(|(field, importance, threshold)| self.assess_field(record, *field, *importance, *threshold))
            .collect();

        let completeness = completeness_percent(&gaps);
        let critical_gaps = count_unmet(&gaps, Importance::Critical);
        let important_gaps = count_unmet(&gaps, Importance::Important);

        let readiness = if critical_gaps == 0 && important_gaps <= 1 {
            Readiness::Ready
        } else if critical_gaps <= 1 && completeness >= 60 {
            Readiness::NeedsWork
        } else {
            Readiness::Minimal
        };

        let source_suggestions = suggest_sources(&gaps, used_sources);
        let next_action = next_action(&gaps, completeness, critical_gaps);

        debug!(
            completeness,
            critical_gaps,
            readiness = ?readiness,
            "gap analysis complete"
        );

        GapReport {
            gaps,
            completeness,
            readiness,
            source_suggestions,
            next_action,
        }
    }

    fn assess_field(
        &self,
        record: &EventRecord,
        field: FusableField,
        importance: Importance,
        threshold: u8,
    ) -> DataGap {
        let (status, confidence) = match record.field(field) {
            None => (GapStatus::Missing, 0),
            Some(parsed) if parsed.confidence < threshold => {
                (GapStatus::LowConfidence, parsed.confidence)
            }
            Some(parsed) if is_partial(field, &parsed.value) => {
                (GapStatus::Partial, parsed.confidence)
            }
            Some(parsed) => (GapStatus::Good, parsed.confidence),
        };

        let suggestions = match status {
            GapStatus::Missing => vec![format!(
                "no {} extracted; add a source that carries it",
                field.name()
            )],
            GapStatus::LowConfidence => vec![format!(
                "{} extracted at confidence {}, below the {} bar; confirm or re-extract",
                field.name(),
                confidence,
                threshold
            )],
            GapStatus::Partial => vec![format!(
                "{} looks incomplete; fill in the missing part",
                field.name()
            )],
            GapStatus::Good => Vec::new(),
        };

        DataGap {
            field,
            confidence,
            status,
            importance,
            suggestions,
        }
    }
}

impl Default for GapAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Field-specific partial-completeness heuristics.
fn is_partial(field: FusableField, value: &str) -> bool {
    match field {
        // A date without any time component
        FusableField::Date => {
            !value.contains(':') && !value.to_lowercase().contains("am")
                && !value.to_lowercase().contains("pm")
        }
        // Only one of email/phone present
        FusableField::ContactInfo => {
            let has_email = value.contains('@');
            let has_phone = value.chars().filter(|c| c.is_ascii_digit()).count() >= 7;
            has_email != has_phone
        }
        FusableField::Description => value.len() < 50,
        FusableField::Location => value.len() < 8,
        _ => false,
    }
}

/// Unmet means missing or below the confidence bar; partial still counts as
/// half-achieved in the completeness score.
fn count_unmet(gaps: &[DataGap], importance: Importance) -> usize {
    gaps.iter()
        .filter(|g| g.importance == importance)
        .filter(|g| matches!(g.status, GapStatus::Missing | GapStatus::LowConfidence))
        .count()
}

fn completeness_percent(gaps: &[DataGap]) -> u8 {
    let mut total = 0.0;
    let mut achieved = 0.0;
    for gap in gaps {
        let weight = gap.importance.weight() as f64;
        total += weight;
        achieved += weight
            * match gap.status {
                GapStatus::Good => 1.0,
                GapStatus::Partial => 0.5,
                _ => 0.0,
            };
    }
    ((achieved / total) * 100.0).round() as u8
}

/// Rank unused source types by importance-weighted relevance to the open
/// gaps; top 3 returned.
fn suggest_sources(gaps: &[DataGap], used_sources: &[SourceType]) -> Vec<SourceSuggestion> {
    let open: Vec<&DataGap> = gaps
        .iter()
        .filter(|g| !matches!(g.status, GapStatus::Good))
        .collect();

    let mut suggestions: Vec<SourceSuggestion> = SOURCE_CAPABILITIES
        .iter()
        .filter(|(source_type, _)| !used_sources.contains(source_type))
        .map(|(source_type, capabilities)| {
            let mut score = 0;
            let mut covered: Vec<&'static str> = Vec::new();
            for gap in &open {
                let relevance = capabilities
                    .iter()
                    .find(|(f, _)| *f == gap.field)
                    .map(|(_, r)| *r)
                    .unwrap_or(0);
                if relevance > 0 {
                    score += gap.importance.weight() * relevance;
                    covered.push(gap.field.name());
                }
            }
            SourceSuggestion {
                source_type: *source_type,
                score,
                reason: if covered.is_empty() {
                    "no open gaps this source would cover".to_string()
                } else {
                    format!("could fill: {}", covered.join(", "))
                },
            }
        })
        .filter(|s| s.score > 0)
        .collect();

    suggestions.sort_by(|a, b| b.score.cmp(&a.score));
    suggestions.truncate(3);
    suggestions
}

fn next_action(gaps: &[DataGap], completeness: u8, critical_gaps: usize) -> NextAction {
    if critical_gaps == 0 && completeness >= 70 {
        return NextAction::ReadyToCreate;
    }

    // Most relevant missing critical field, in table order
    if let Some(gap) = gaps
        .iter()
        .find(|g| g.importance == Importance::Critical && g.status == GapStatus::Missing)
    {
        let source_type = best_source_for(gap.field);
        return NextAction::AddSource {
            field: gap.field,
            source_type,
        };
    }

    if let Some(gap) = gaps
        .iter()
        .find(|g| g.importance == Importance::Critical && g.status == GapStatus::LowConfidence)
    {
        return NextAction::ManualEdit { field: gap.field };
    }

    NextAction::AddAnotherSource
}

fn best_source_for(field: FusableField) -> SourceType {
    SOURCE_CAPABILITIES
        .iter()
        .max_by_key(|(_, capabilities)| {
            capabilities
                .iter()
                .find(|(f, _)| *f == field)
                .map(|(_, r)| *r)
                .unwrap_or(0)
        })
        .map(|(source_type, _)| *source_type)
        .unwrap_or(SourceType::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParsedField;

    fn record_with(fields: &[(FusableField, &str, u8)]) -> EventRecord {
        let mut record = EventRecord::default();
        for (field, value, confidence) in fields {
            record.set_field(*field, Some(ParsedField::new(*value, *confidence, "test")));
        }
        record
    }

    #[test]
    fn test_all_eight_fields_reported() {
        let report = GapAnalyzer::new().analyze(&EventRecord::default(), &[]);
        assert_eq!(report.gaps.len(), 8);
        assert!(report.gaps.iter().all(|g| g.status == GapStatus::Missing));
        assert_eq!(report.completeness, 0);
        assert_eq!(report.readiness, Readiness::Minimal);
    }

    #[test]
    fn test_status_precedence() {
        let record = record_with(&[
            (FusableField::Title, "Jazz Night", 90),              // good
            (FusableField::Date, "12 July 2026", 30),             // low confidence
            (FusableField::Description, "short", 80),             // partial
        ]);
        let report = GapAnalyzer::new().analyze(&record, &[]);
        let by_field = |f: FusableField| {
            report.gaps.iter().find(|g| g.field == f).unwrap().status
        };
        assert_eq!(by_field(FusableField::Title), GapStatus::Good);
        assert_eq!(by_field(FusableField::Date), GapStatus::LowConfidence);
        assert_eq!(by_field(FusableField::Description), GapStatus::Partial);
        assert_eq!(by_field(FusableField::Location), GapStatus::Missing);
    }

    #[test]
    fn test_date_without_time_is_partial() {
        let record = record_with(&[(FusableField::Date, "12 July 2026", 85)]);
        let report = GapAnalyzer::new().analyze(&record, &[]);
        let date_gap = report.gaps.iter().find(|g| g.field == FusableField::Date).unwrap();
        assert_eq!(date_gap.status, GapStatus::Partial);

        let record = record_with(&[(FusableField::Date, "12 July 2026 7:30pm", 95)]);
        let report = GapAnalyzer::new().analyze(&record, &[]);
        let date_gap = report.gaps.iter().find(|g| g.field == FusableField::Date).unwrap();
        assert_eq!(date_gap.status, GapStatus::Good);
    }

    #[test]
    fn test_ready_record() {
        let record = record_with(&[
            (FusableField::Title, "Harvest Festival", 90),
            (FusableField::Date, "3 Oct 2026 11:00am", 95),
            (FusableField::Location, "Abbey Fields, Town Centre", 85),
            (FusableField::Description, &"d".repeat(80) as &str, 80),
            (FusableField::TicketInfo, "free", 85),
        ]);
        let report = GapAnalyzer::new().analyze(&record, &[SourceType::Text]);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.next_action, NextAction::ReadyToCreate);
    }

    #[test]
    fn test_missing_critical_field_suggests_source() {
        let record = record_with(&[
            (FusableField::Title, "Quiz Night", 90),
            (FusableField::Location, "The Anchor Inn", 80),
        ]);
        let report = GapAnalyzer::new().analyze(&record, &[SourceType::Text]);
        match report.next_action {
            NextAction::AddSource { field, .. } => assert_eq!(field, FusableField::Date),
            other => panic!("expected AddSource, got {:?}", other),
        }
    }

    #[test]
    fn test_low_confidence_critical_field_suggests_manual_edit() {
        let record = record_with(&[
            (FusableField::Title, "Quiz Night", 40),
            (FusableField::Date, "12/07/2026 8pm", 95),
        ]);
        let report = GapAnalyzer::new().analyze(&record, &[]);
        assert_eq!(
            report.next_action,
            NextAction::ManualEdit {
                field: FusableField::Title
            }
        );
    }

    #[test]
    fn test_source_suggestions_exclude_used_types() {
        let report = GapAnalyzer::new().analyze(
            &EventRecord::default(),
            &[SourceType::Text, SourceType::Image],
        );
        assert!(report
            .source_suggestions
            .iter()
            .all(|s| s.source_type == SourceType::Url));
    }

    #[test]
    fn test_suggestions_sorted_and_capped() {
        let report = GapAnalyzer::new().analyze(&EventRecord::default(), &[]);
        assert!(report.source_suggestions.len() <= 3);
        for pair in report.source_suggestions.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
