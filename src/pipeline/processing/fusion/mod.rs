use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::FusionConfig;
use crate::domain::{EventRecord, FusableField, ParsedField, SourceType};
use crate::error::{ProcessingError, Result};
use crate::pipeline::processing::extract::ProcessingResult;

/// Metadata key carrying an input-level priority override into fusion.
pub const PRIORITY_OVERRIDE_KEY: &str = "source_priority";

const CONSENSUS_BONUS: u8 = 10;
const MANUAL_CANDIDATE_LIMIT: usize = 4;

/// How a field conflict is resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    #[default]
    HighestConfidence,
    SourcePriority,
    Consensus,
    ManualReview,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Auto,
    Manual,
}

/// One value competing for a conflicted field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub value: String,
    pub confidence: u8,
    pub source: SourceType,
    pub priority: u8,
}

/// A per-field disagreement detected across sources. Transient: lives only
/// for the duration of one fusion pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: FusableField,
    pub candidates: Vec<ConflictCandidate>,
    pub resolution: Resolution,
    pub strategy: FusionStrategy,
}

/// The outcome of fusing one or more successful extraction results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    pub fused: EventRecord,
    pub conflicts: Vec<FieldConflict>,
    /// Per-field confidence breakdown of the fused record
    pub field_confidence: HashMap<String, u8>,
    /// Cross-source agreement, 0 to 100
    pub agreement: u8,
    /// Weighted field completeness, 0 to 100
    pub completeness: u8,
    /// Advisory only; never blocks the result
    pub recommendations: Vec<String>,
    pub needs_review: bool,
}

/// Detects per-field conflicts across successful results, resolves them via
/// the configured strategy and recomputes record confidence.
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse the successful results of one orchestration run. Requires at
    /// least one success.
    pub fn fuse(&self, results: &[ProcessingResult]) -> Result<FusionResult> {
        let records: Vec<&EventRecord> = results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.data.as_ref())
            .collect();

        if records.is_empty() {
            return Err(ProcessingError::NoSuccessfulResults);
        }

        if records.len() == 1 {
            return Ok(self.single_source(records[0]));
        }

        let conflicts = self.detect_conflicts(&records);
        let fused = self.build_fused_record(&records, &conflicts);
        self.finish(fused, conflicts, records.len())
    }

    /// A single result is passed through untouched, with agreement
    /// synthesized as full.
    fn single_source(&self, record: &EventRecord) -> FusionResult {
        let fused = record.clone();
        let completeness = completeness_score(&fused);
        let needs_review = fused.overall_confidence < 60;
        let mut recommendations = Vec::new();
        if completeness < 70 {
            recommendations
                .push("add another source to fill missing or weak fields".to_string());
        }

        FusionResult {
            field_confidence: confidence_breakdown(&fused),
            fused,
            conflicts: Vec::new(),
            agreement: 100,
            completeness,
            recommendations,
            needs_review,
        }
    }

    /// A field conflicts when at least two sources supply distinct normalized
    /// values at or above the confidence threshold.
    fn detect_conflicts(&self, records: &[&EventRecord]) -> Vec<FieldConflict> {
        let mut conflicts = Vec::new();

        for field in FusableField::ALL {
            let candidates: Vec<ConflictCandidate> = records
                .iter()
                .filter_map(|record| {
                    record.field(field).and_then(|parsed| {
                        (parsed.confidence >= self.config.conflict_threshold).then(|| {
                            ConflictCandidate {
                                value: parsed.value.clone(),
                                confidence: parsed.confidence,
                                source: record.source_type.unwrap_or(SourceType::Text),
                                priority: record_priority(record),
                            }
                        })
                    })
                })
                .collect();

            let mut distinct: Vec<String> = candidates
                .iter()
                .map(|c| normalize_value(&c.value))
                .collect();
            distinct.sort();
            distinct.dedup();

            if distinct.len() >= 2 {
                let strategy = self
                    .config
                    .field_strategies
                    .get(field.name())
                    .copied()
                    .unwrap_or(self.config.default_strategy);
                let resolution = if strategy == FusionStrategy::ManualReview
                    || candidates.len() > MANUAL_CANDIDATE_LIMIT
                {
                    Resolution::Manual
                } else {
                    Resolution::Auto
                };
                debug!(field = field.name(), candidates = candidates.len(), "field conflict");
                conflicts.push(FieldConflict {
                    field,
                    candidates,
                    resolution,
                    strategy,
                });
            }
        }

        conflicts
    }

    /// The highest-priority result supplies untouched fields and the
    /// array-field baseline; conflicted fields are replaced by the strategy
    /// winner, and fields the base lacks are filled from other sources.
    fn build_fused_record(
        &self,
        records: &[&EventRecord],
        conflicts: &[FieldConflict],
    ) -> EventRecord {
        // First record wins priority ties, keeping fusion deterministic
        let mut base = records[0];
        let mut base_priority = record_priority(base);
        for &record in records.iter().skip(1) {
            let priority = record_priority(record);
            if priority > base_priority {
                base_priority = priority;
                base = record;
            }
        }
        let mut fused = base.clone();

        for conflict in conflicts {
            let winner = self.resolve(conflict);
            fused.set_field(conflict.field, Some(winner));
        }

        // Non-conflicted fields missing from the base are filled with the
        // most confident value any other source produced.
        for field in FusableField::ALL {
            if fused.field(field).is_some() || conflicts.iter().any(|c| c.field == field) {
                continue;
            }
            let best = records
                .iter()
                .filter_map(|r| r.field(field))
                .fold(None::<&ParsedField>, |acc, parsed| match acc {
                    Some(current) if current.confidence >= parsed.confidence => Some(current),
                    _ => Some(parsed),
                });
            if let Some(parsed) = best {
                fused.set_field(field, Some(parsed.clone()));
            }
        }

        fused.categories = fuse_categories(records);
        fused.tags = fuse_tags(records);
        fused
    }

    /// Apply exactly one strategy to a conflict and return the winning field.
    fn resolve(&self, conflict: &FieldConflict) -> ParsedField {
        let provenance = format!("fusion:{}", strategy_name(conflict.strategy));
        let winner = match conflict.strategy {
            FusionStrategy::HighestConfidence | FusionStrategy::ManualReview => {
                highest_confidence(&conflict.candidates).clone()
            }
            FusionStrategy::SourcePriority => {
                let mut best = &conflict.candidates[0];
                for candidate in &conflict.candidates[1..] {
                    if candidate.priority > best.priority {
                        best = candidate;
                    }
                }
                best.clone()
            }
            FusionStrategy::Consensus => {
                // Group candidates by normalized value, first-seen order
                let mut groups: Vec<(String, Vec<&ConflictCandidate>)> = Vec::new();
                for candidate in &conflict.candidates {
                    let key = normalize_value(&candidate.value);
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(candidate),
                        None => groups.push((key, vec![candidate])),
                    }
                }
                // First-seen group wins size ties
                let mut largest = &groups[0];
                for group in &groups[1..] {
                    if group.1.len() > largest.1.len() {
                        largest = group;
                    }
                }

                if largest.1.len() >= self.config.consensus_threshold {
                    let mut winner = highest_confidence_of(&largest.1).clone();
                    winner.confidence =
                        winner.confidence.saturating_add(CONSENSUS_BONUS).min(100);
                    winner
                } else {
                    highest_confidence(&conflict.candidates).clone()
                }
            }
        };

        let mut field = ParsedField::new(winner.value, winner.confidence, provenance);
        field.span = None;
        field
    }

    fn finish(
        &self,
        mut fused: EventRecord,
        conflicts: Vec<FieldConflict>,
        source_count: usize,
    ) -> Result<FusionResult> {
        let agreement = agreement_score(conflicts.len());
        let completeness = completeness_score(&fused);

        let populated: Vec<u8> = FusableField::ALL
            .iter()
            .filter_map(|f| fused.field(*f).map(|p| p.confidence))
            .collect();
        let avg_confidence = if populated.is_empty() {
            0.0
        } else {
            populated.iter().map(|c| *c as f64).sum::<f64>() / populated.len() as f64
        };

        let overall =
            0.6 * avg_confidence + 0.2 * agreement as f64 + 0.2 * completeness as f64;
        fused.overall_confidence = overall.round().clamp(0.0, 100.0) as u8;

        let has_manual = conflicts.iter().any(|c| c.resolution == Resolution::Manual);
        let has_date_conflict = conflicts.iter().any(|c| c.field == FusableField::Date);
        let needs_review = fused.overall_confidence < 60
            || has_manual
            || agreement < 50
            || has_date_conflict;

        let mut recommendations = Vec::new();
        if has_date_conflict {
            recommendations.push("sources disagree on the event date; verify before publishing".to_string());
        }
        for conflict in &conflicts {
            if conflict.resolution == Resolution::Manual {
                recommendations.push(format!(
                    "field '{}' was auto-resolved but flagged for manual review",
                    conflict.field.name()
                ));
            }
        }
        if completeness < 70 {
            recommendations.push("add another source to fill missing or weak fields".to_string());
        }

        debug!(
            sources = source_count,
            conflicts = conflicts.len(),
            overall = fused.overall_confidence,
            "fusion complete"
        );

        Ok(FusionResult {
            field_confidence: confidence_breakdown(&fused),
            fused,
            conflicts,
            agreement,
            completeness,
            recommendations,
            needs_review,
        })
    }
}

fn strategy_name(strategy: FusionStrategy) -> &'static str {
    match strategy {
        FusionStrategy::HighestConfidence => "highest_confidence",
        FusionStrategy::SourcePriority => "source_priority",
        FusionStrategy::Consensus => "consensus",
        FusionStrategy::ManualReview => "manual_review",
    }
}

/// Lower-cased, trimmed, inner whitespace collapsed.
pub fn normalize_value(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn record_priority(record: &EventRecord) -> u8 {
    if let Some(value) = record.metadata.get(PRIORITY_OVERRIDE_KEY) {
        if let Some(priority) = value.as_u64() {
            return priority.min(u8::MAX as u64) as u8;
        }
    }
    record
        .source_type
        .map(|s| s.default_priority())
        .unwrap_or(0)
}

/// Greatest confidence wins; ties go to the first seen.
fn highest_confidence(candidates: &[ConflictCandidate]) -> &ConflictCandidate {
    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.confidence > best.confidence {
            best = candidate;
        }
    }
    best
}

fn highest_confidence_of<'a>(candidates: &[&'a ConflictCandidate]) -> &'a ConflictCandidate {
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.confidence > best.confidence {
            best = candidate;
        }
    }
    best
}

fn agreement_score(conflict_count: usize) -> u8 {
    let total_fields = FusableField::ALL.len() as f64;
    let score = 100.0 - (conflict_count as f64 / total_fields) * 50.0;
    score.max(0.0).round() as u8
}

/// Weighted completeness: title and date are required (weight 3), every other
/// fusable field weighs 1. A field is met when its confidence exceeds 30.
fn completeness_score(record: &EventRecord) -> u8 {
    let mut total = 0u32;
    let mut achieved = 0u32;
    for field in FusableField::ALL {
        let weight = match field {
            FusableField::Title | FusableField::Date => 3,
            _ => 1,
        };
        total += weight;
        if record.field(field).map(|p| p.confidence > 30).unwrap_or(false) {
            achieved += weight;
        }
    }
    ((achieved * 100 + total / 2) / total) as u8
}

fn confidence_breakdown(record: &EventRecord) -> HashMap<String, u8> {
    FusableField::ALL
        .iter()
        .filter_map(|f| record.field(*f).map(|p| (f.name().to_string(), p.confidence)))
        .collect()
}

/// Categories fused by cross-source frequency; top 3, ties by first-seen.
fn fuse_categories(records: &[&EventRecord]) -> Vec<String> {
    ranked_by_frequency(records.iter().flat_map(|r| r.categories.iter()))
        .into_iter()
        .take(3)
        .collect()
}

/// Tags fused by frequency, all retained up to the cap of 10.
fn fuse_tags(records: &[&EventRecord]) -> Vec<String> {
    ranked_by_frequency(records.iter().flat_map(|r| r.tags.iter()))
        .into_iter()
        .take(10)
        .collect()
}

fn ranked_by_frequency<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        if !counts.contains_key(value) {
            order.push(value.clone());
        }
        *counts.entry(value.clone()).or_insert(0) += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
}
