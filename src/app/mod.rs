pub mod orchestrate_use_case;
pub mod ports;
pub mod quality_use_case;

pub use orchestrate_use_case::{MultiSourceResult, Orchestrator};
pub use quality_use_case::QualityUseCase;
