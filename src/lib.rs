//! Multi-source event announcement ingestion: rule-based extraction from
//! text, images and web pages, confidence-weighted fusion of the results,
//! gap analysis on the fused record and catalog-wide quality checks.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod progress;

pub use app::{MultiSourceResult, Orchestrator, QualityUseCase};
pub use config::PipelineConfig;
pub use error::{ProcessingError, Result};
