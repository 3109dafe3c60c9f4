use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use tracing::debug;

use super::{ProcessingResult, SourceInput, SourcePayload, SourceProcessor};
use crate::domain::{EventRecord, ParsedField, SourceType};

pub const PROCESSOR_NAME: &str = "text_processor";

const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_CATEGORIES: usize = 3;
const MAX_TAGS: usize = 10;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)[^\s<>()]+").unwrap());

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?(?:\(\d{2,5}\)[\s.-]?)?\d{3,5}[\s.-]\d{3,4}(?:[\s.-]\d{3,4})?").unwrap());

/// Date patterns in priority order; the first match wins and no cross-pattern
/// merging is attempted.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Explicit day-month or month-day with a month name
        Regex::new(r"(?i)\b(?:\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?(?:,?\s+\d{4})?|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?)\b").unwrap(),
        // Numeric day/month/year
        Regex::new(r"\b\d{1,2}[/.]\d{1,2}[/.]\d{2,4}\b").unwrap(),
        // ISO date
        Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap(),
        // Relative terms
        Regex::new(r"(?i)\b(?:today|tonight|tomorrow|this\s+(?:weekend|week)|next\s+(?:week|monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b").unwrap(),
    ]
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s*(?:am|pm)\b|\b\d{1,2}:\d{2}\b").unwrap()
});

static LOCATION_PREFIX_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?im)^\s*(?:venue|location|where)\s*:\s*(.+)$").unwrap(),
        Regex::new(r"(?im)^\s*at\s+(.+)$").unwrap(),
    ]
});

const VENUE_NOUNS: [&str; 22] = [
    "hall", "centre", "center", "club", "theatre", "theater", "park", "arena", "stadium",
    "church", "cafe", "bar", "pub", "gallery", "library", "school", "hotel", "museum",
    "street", "avenue", "road", "square",
];

static ORGANIZER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?im)^\s*organi[sz]er\s*:\s*(.+)$").unwrap(),
        Regex::new(r"(?i)\b(?:hosted\s+by|organi[sz]ed\s+by|presented\s+by|by)\s+([A-Z][\w&'. -]{2,50})").unwrap(),
    ]
});

/// Ticket price patterns in priority order.
static TICKET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Currency-prefixed amounts, optionally a list or range with door/advance notes
        Regex::new(r"(?i)[£$€]\s?\d+(?:\.\d{2})?(?:\s*(?:[-–/,]|to)\s*[£$€]?\s?\d+(?:\.\d{2})?)*(?:\s*(?:on\s+the\s+door|door|otd|adv|advance))?").unwrap(),
        // Free admission
        Regex::new(r"(?i)\b(?:free\s+(?:entry|admission|event)|entry\s+free|admission\s+free|free)\b").unwrap(),
        // Advance/door combination without currency symbols
        Regex::new(r"(?i)\b\d+(?:\.\d{2})?\s*(?:adv|advance|in\s+advance)\s*[,/]?\s*\d+(?:\.\d{2})?\s*(?:door|otd|on\s+the\s+door)\b").unwrap(),
        // Labeled prefixes
        Regex::new(r"(?im)^\s*(?:tickets?|price|cost|entry|admission)\s*:\s*(.+)$").unwrap(),
    ]
});

static HOSTED_BY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:hosted|organi[sz]ed|presented)\s+by\b").unwrap());

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fixed category table scored by keyword frequency. Order matters: ties are
/// broken by position in this table.
static CATEGORY_TABLE: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        ("music", vec!["music", "concert", "gig", "band", "dj", "jazz", "rock", "choir", "orchestra", "acoustic", "live music"]),
        ("arts", vec!["art", "exhibition", "gallery", "craft", "painting", "sculpture", "photography"]),
        ("theatre", vec!["theatre", "theater", "play", "drama", "musical", "performance", "stage"]),
        ("comedy", vec!["comedy", "comedian", "stand-up", "standup", "improv"]),
        ("film", vec!["film", "cinema", "movie", "screening", "documentary"]),
        ("food-drink", vec!["food", "tasting", "dinner", "brunch", "beer", "wine", "festival of food", "street food"]),
        ("nightlife", vec!["nightlife", "club night", "party", "rave", "late night"]),
        ("sports", vec!["sport", "sports", "match", "race", "run", "marathon", "tournament", "fitness", "yoga"]),
        ("family", vec!["family", "kids", "children", "toddler", "all ages"]),
        ("community", vec!["community", "meetup", "social", "neighbourhood", "neighborhood", "volunteer"]),
        ("education", vec!["workshop", "talk", "lecture", "class", "course", "seminar", "training"]),
        ("market", vec!["market", "fair", "stall", "bazaar", "car boot"]),
        ("charity", vec!["charity", "fundraiser", "fundraising", "donation", "benefit"]),
    ]
});

/// Deterministic rule-based extractor over a free-text blob. Pure: identical
/// input yields identical fields and confidences on every run.
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Run the full extraction. Synchronous and side-effect free.
    pub fn extract(&self, text: &str) -> EventRecord {
        let mut record = EventRecord {
            source_type: Some(SourceType::Text),
            ..EventRecord::default()
        };

        let (title, title_line_idx) = self.extract_title(text);
        record.title = title;
        record.date = self.extract_date(text);
        record.location = self.extract_location(text);
        record.contact_info = self.extract_contact(text);
        record.website = self.extract_website(text);
        record.organizer = self.extract_organizer(text);
        record.ticket_info = self.extract_ticket_info(text);
        record.description = self.extract_description(text, title_line_idx);
        record.categories = self.extract_categories(text);
        record.tags = self.extract_tags(text, &record);
        record.overall_confidence = overall_confidence(&record);

        debug!(
            confidence = record.overall_confidence,
            "text extraction complete"
        );
        record
    }

    /// First line that is not an address-ish, URL-ish or date-shaped token.
    fn extract_title(&self, text: &str) -> (Option<ParsedField>, Option<usize>) {
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.contains('@') || URL_RE.is_match(line) || is_date_shaped(line) {
                continue;
            }

            let value = if is_all_caps(line) {
                to_title_case(line)
            } else {
                line.to_string()
            };
            let confidence = if value.len() > 5 { 90 } else { 70 };
            return (
                Some(ParsedField::new(value, confidence, PROCESSOR_NAME)),
                Some(idx),
            );
        }
        (None, None)
    }

    fn extract_date(&self, text: &str) -> Option<ParsedField> {
        for pattern in DATE_PATTERNS.iter() {
            if let Some(m) = pattern.find(text) {
                let mut value = m.as_str().trim().to_string();
                let mut confidence = 85;
                if let Some(t) = TIME_RE.find(text) {
                    value = format!("{} {}", value, t.as_str().trim());
                    confidence = 95;
                }
                return Some(
                    ParsedField::new(value, confidence, PROCESSOR_NAME)
                        .with_span(m.start(), m.end()),
                );
            }
        }
        None
    }

    /// Explicit prefixes first, then the first line carrying a venue noun.
    /// Absent locations are omitted, never present at confidence zero.
    fn extract_location(&self, text: &str) -> Option<ParsedField> {
        for pattern in LOCATION_PREFIX_RES.iter() {
            if let Some(caps) = pattern.captures(text) {
                let m = caps.get(1).unwrap();
                let value = m.as_str().trim().trim_end_matches(['.', ',']).to_string();
                if !value.is_empty() {
                    return Some(
                        ParsedField::new(value, 85, PROCESSOR_NAME).with_span(m.start(), m.end()),
                    );
                }
            }
        }

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || URL_RE.is_match(trimmed) {
                continue;
            }
            let lower = trimmed.to_lowercase();
            if VENUE_NOUNS.iter().any(|noun| lower.contains(noun)) {
                return Some(ParsedField::new(trimmed, 75, PROCESSOR_NAME));
            }
        }
        None
    }

    /// First email plus first phone number, joined when both are present.
    fn extract_contact(&self, text: &str) -> Option<ParsedField> {
        let email = EMAIL_RE.find(text).map(|m| m.as_str().to_string());
        let phone = PHONE_RE.find(text).map(|m| m.as_str().trim().to_string());

        let value = match (email, phone) {
            (Some(e), Some(p)) => format!("{} / {}", e, p),
            (Some(e), None) => e,
            (None, Some(p)) => p,
            (None, None) => return None,
        };
        Some(ParsedField::new(value, 90, PROCESSOR_NAME))
    }

    /// First URL-shaped token, normalized to carry a scheme.
    fn extract_website(&self, text: &str) -> Option<ParsedField> {
        let m = URL_RE.find(text)?;
        let raw = m.as_str().trim_end_matches(['.', ',', ')']);
        let value = if raw.to_lowercase().starts_with("http") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        Some(ParsedField::new(value, 95, PROCESSOR_NAME).with_span(m.start(), m.end()))
    }

    fn extract_organizer(&self, text: &str) -> Option<ParsedField> {
        for pattern in ORGANIZER_RES.iter() {
            if let Some(caps) = pattern.captures(text) {
                let m = caps.get(1).unwrap();
                let value = m.as_str().trim().trim_end_matches(['.', ',']).to_string();
                if !value.is_empty() {
                    return Some(
                        ParsedField::new(value, 80, PROCESSOR_NAME).with_span(m.start(), m.end()),
                    );
                }
            }
        }
        None
    }

    fn extract_ticket_info(&self, text: &str) -> Option<ParsedField> {
        for (idx, pattern) in TICKET_PATTERNS.iter().enumerate() {
            if let Some(caps) = pattern.captures(text) {
                // The labeled-prefix pattern captures the value after the label
                let m = caps.get(1).unwrap_or_else(|| caps.get(0).unwrap());
                let value = m.as_str().trim().to_string();
                if value.is_empty() {
                    continue;
                }
                debug!(pattern = idx, "ticket pattern matched");
                return Some(
                    ParsedField::new(value, 85, PROCESSOR_NAME).with_span(m.start(), m.end()),
                );
            }
        }
        None
    }

    /// Remaining non-metadata lines concatenated, capped at 500 characters.
    fn extract_description(&self, text: &str, title_line_idx: Option<usize>) -> Option<ParsedField> {
        let mut parts = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if Some(idx) == title_line_idx {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || is_metadata_line(trimmed) {
                continue;
            }
            parts.push(trimmed);
        }
        if parts.is_empty() {
            return None;
        }

        let mut value = parts.join(" ");
        if value.len() > MAX_DESCRIPTION_LEN {
            let mut cut = MAX_DESCRIPTION_LEN;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
        }
        let confidence = if value.len() >= 100 { 80 } else { 60 };
        Some(ParsedField::new(value, confidence, PROCESSOR_NAME))
    }

    /// Keyword-frequency scoring against the fixed category table. Top 3
    /// non-zero scores; ties broken by table order.
    fn extract_categories(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut scored: Vec<(usize, usize, &str)> = CATEGORY_TABLE
            .iter()
            .enumerate()
            .map(|(order, (name, keywords))| {
                let score: usize = keywords.iter().map(|k| lower.matches(k).count()).sum();
                (score, order, *name)
            })
            .filter(|(score, _, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(MAX_CATEGORIES)
            .map(|(_, _, name)| name.to_string())
            .collect()
    }

    /// Hashtags plus a few heuristic tags, capped at 10.
    fn extract_tags(&self, text: &str, record: &EventRecord) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let mut push = |tag: String| {
            if !tags.contains(&tag) && tags.len() < MAX_TAGS {
                tags.push(tag);
            }
        };

        for caps in HASHTAG_RE.captures_iter(text) {
            push(caps[1].to_lowercase());
        }

        if let Some(category) = record.categories.first() {
            push(category.clone());
        }
        if let Some(ticket) = &record.ticket_info {
            if ticket.value.to_lowercase().contains("free") {
                push("free".to_string());
            } else {
                push("paid".to_string());
            }
        }
        let lower = text.to_lowercase();
        if lower.contains("family") || lower.contains("kids") || lower.contains("children") {
            push("family-friendly".to_string());
        }

        tags
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceProcessor for TextProcessor {
    fn source_type(&self) -> SourceType {
        SourceType::Text
    }

    fn can_handle(&self, input: &SourceInput) -> bool {
        matches!(&input.payload, SourcePayload::Text(t) if !t.trim().is_empty())
    }

    async fn process(&self, input: &SourceInput) -> ProcessingResult {
        let start = Instant::now();
        let text = match &input.payload {
            SourcePayload::Text(t) => t,
            _ => {
                return ProcessingResult::failed(
                    "text processor received a non-text payload",
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        let record = self.extract(text);
        let mut warnings = Vec::new();
        if record.title.is_none() {
            warnings.push("no title candidate found in text".to_string());
        }
        if record.date.is_none() {
            warnings.push("no recognizable date in text".to_string());
        }
        ProcessingResult::ok(record, warnings, start.elapsed().as_millis() as u64)
    }
}

/// Weighted presence-bonus sum, normalized to a 0-100 scale.
pub fn overall_confidence(record: &EventRecord) -> u8 {
    let weights: [(bool, u32); 10] = [
        (record.title.is_some(), 25),
        (record.date.is_some(), 25),
        (record.location.is_some(), 20),
        (record.organizer.is_some(), 15),
        (record.description.is_some(), 15),
        (!record.categories.is_empty(), 15),
        (record.ticket_info.is_some(), 10),
        (record.contact_info.is_some(), 10),
        (record.website.is_some(), 10),
        (!record.tags.is_empty(), 10),
    ];
    let total: u32 = weights.iter().map(|(_, w)| w).sum();
    let achieved: u32 = weights.iter().filter(|(p, _)| *p).map(|(_, w)| w).sum();
    ((achieved * 100 + total / 2) / total) as u8
}

fn is_all_caps(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

fn to_title_case(line: &str) -> String {
    WHITESPACE_RE
        .split(line.trim())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_date_shaped(line: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(line))
}

fn is_metadata_line(line: &str) -> bool {
    if URL_RE.is_match(line) || EMAIL_RE.is_match(line) || PHONE_RE.is_match(line) {
        return true;
    }
    if is_date_shaped(line) {
        return true;
    }
    if LOCATION_PREFIX_RES.iter().any(|p| p.is_match(line)) {
        return true;
    }
    if ORGANIZER_RES[0].is_match(line) || HOSTED_BY_LINE_RE.is_match(line) {
        return true;
    }
    // Labeled ticket lines
    if TICKET_PATTERNS[3].is_match(line) {
        return true;
    }
    // Hashtag-only lines
    let without_tags = HASHTAG_RE.replace_all(line, "");
    without_tags.trim().is_empty()
}
