use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The kinds of sources the pipeline can extract from.
///
/// This is a closed set: adding a source kind means adding a processor for it,
/// not subclassing anything.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Image,
    Url,
}

impl SourceType {
    /// Default fusion tie-break priority for this source kind.
    /// Structured web data is trusted over vision output over free text.
    pub fn default_priority(&self) -> u8 {
        match self {
            SourceType::Text => 1,
            SourceType::Image => 2,
            SourceType::Url => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Image => "image",
            SourceType::Url => "url",
        }
    }
}

/// A single extracted field value with its confidence and lineage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedField {
    /// The extracted value
    pub value: String,
    /// Confidence in the extraction (0 to 100)
    pub confidence: u8,
    /// Name of the processor that produced this value
    pub provenance: String,
    /// Byte span in the source text, when known
    pub span: Option<(usize, usize)>,
}

impl ParsedField {
    pub fn new(value: impl Into<String>, confidence: u8, provenance: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.min(100),
            provenance: provenance.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }
}

/// The canonical scalar fields every processor can populate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FusableField {
    Title,
    Description,
    Date,
    Location,
    Organizer,
    TicketInfo,
    ContactInfo,
    Website,
}

impl FusableField {
    pub const ALL: [FusableField; 8] = [
        FusableField::Title,
        FusableField::Description,
        FusableField::Date,
        FusableField::Location,
        FusableField::Organizer,
        FusableField::TicketInfo,
        FusableField::ContactInfo,
        FusableField::Website,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FusableField::Title => "title",
            FusableField::Description => "description",
            FusableField::Date => "date",
            FusableField::Location => "location",
            FusableField::Organizer => "organizer",
            FusableField::TicketInfo => "ticket_info",
            FusableField::ContactInfo => "contact_info",
            FusableField::Website => "website",
        }
    }
}

/// One normalized, confidence-annotated event record produced by a single
/// processor call. Fusion builds new records rather than mutating these.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventRecord {
    pub title: Option<ParsedField>,
    pub description: Option<ParsedField>,
    pub date: Option<ParsedField>,
    pub location: Option<ParsedField>,
    pub organizer: Option<ParsedField>,
    pub ticket_info: Option<ParsedField>,
    pub contact_info: Option<ParsedField>,
    pub website: Option<ParsedField>,
    /// Up to 3 categories, most relevant first
    pub categories: Vec<String>,
    /// Up to 10 tags
    pub tags: Vec<String>,
    /// Aggregate confidence over the whole record (0 to 100)
    pub overall_confidence: u8,
    pub source_type: Option<SourceType>,
    pub source_url: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventRecord {
    pub fn field(&self, field: FusableField) -> Option<&ParsedField> {
        match field {
            FusableField::Title => self.title.as_ref(),
            FusableField::Description => self.description.as_ref(),
            FusableField::Date => self.date.as_ref(),
            FusableField::Location => self.location.as_ref(),
            FusableField::Organizer => self.organizer.as_ref(),
            FusableField::TicketInfo => self.ticket_info.as_ref(),
            FusableField::ContactInfo => self.contact_info.as_ref(),
            FusableField::Website => self.website.as_ref(),
        }
    }

    pub fn set_field(&mut self, field: FusableField, value: Option<ParsedField>) {
        match field {
            FusableField::Title => self.title = value,
            FusableField::Description => self.description = value,
            FusableField::Date => self.date = value,
            FusableField::Location => self.location = value,
            FusableField::Organizer => self.organizer = value,
            FusableField::TicketInfo => self.ticket_info = value,
            FusableField::ContactInfo => self.contact_info = value,
            FusableField::Website => self.website = value,
        }
    }

    /// Fields currently populated, in canonical order.
    pub fn populated_fields(&self) -> Vec<FusableField> {
        FusableField::ALL
            .iter()
            .copied()
            .filter(|f| self.field(*f).is_some())
            .collect()
    }
}

/// A catalog event as seen by the data-quality analyzer.
///
/// `date_text` keeps the raw scanned value so format problems can be flagged
/// even when day-level parsing failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date_text: String,
    pub event_day: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub location_text: Option<String>,
    pub venue_id: Option<Uuid>,
    pub organizer: Option<String>,
    pub website: Option<String>,
    pub categories: Vec<String>,
    /// Confidence reported by whichever scanner produced this event
    pub scanner_confidence: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// A catalog venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}
