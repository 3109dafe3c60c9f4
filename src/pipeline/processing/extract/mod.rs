pub mod image;
pub mod registry;
pub mod text;
pub mod url;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{EventRecord, SourceType};

pub use image::ImageProcessor;
pub use registry::ProcessorRegistry;
pub use text::TextProcessor;
pub use url::UrlProcessor;

/// The payload handed to a processor.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    Text(String),
    Image { bytes: Vec<u8>, mime: String },
    Url(String),
}

/// One input to an orchestration run.
#[derive(Debug, Clone)]
pub struct SourceInput {
    /// Optional hint naming the processor kind the caller expects
    pub source_type: Option<SourceType>,
    pub payload: SourcePayload,
    /// Overrides the processor's default fusion priority when set
    pub priority: Option<u8>,
}

impl SourceInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            source_type: Some(SourceType::Text),
            payload: SourcePayload::Text(text.into()),
            priority: None,
        }
    }

    pub fn image(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            source_type: Some(SourceType::Image),
            payload: SourcePayload::Image {
                bytes,
                mime: mime.into(),
            },
            priority: None,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            source_type: Some(SourceType::Url),
            payload: SourcePayload::Url(url.into()),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Short label for logging and progress updates.
    pub fn describe(&self) -> String {
        match &self.payload {
            SourcePayload::Text(text) => format!("text ({} chars)", text.len()),
            SourcePayload::Image { bytes, mime } => {
                format!("image {} ({} bytes)", mime, bytes.len())
            }
            SourcePayload::Url(url) => format!("url {}", url),
        }
    }
}

/// The outcome of a single processor call. Processors never return `Err`;
/// internal failures are reported as `success: false` with an error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub data: Option<EventRecord>,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

impl ProcessingResult {
    pub fn ok(data: EventRecord, warnings: Vec<String>, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warnings,
            processing_time_ms,
        }
    }

    pub fn failed(error: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            warnings: Vec::new(),
            processing_time_ms,
        }
    }
}

/// Capability contract implemented by every source processor.
#[async_trait]
pub trait SourceProcessor: Send + Sync {
    /// The fixed source kind this processor handles
    fn source_type(&self) -> SourceType;

    /// Fusion tie-break priority for records produced by this processor
    fn priority(&self) -> u8 {
        self.source_type().default_priority()
    }

    /// Cheap, side-effect-free admissibility check
    fn can_handle(&self, input: &SourceInput) -> bool;

    /// Run extraction. This is the only side-effecting call; it must always
    /// come back with a `ProcessingResult` rather than propagating failures.
    async fn process(&self, input: &SourceInput) -> ProcessingResult;
}
