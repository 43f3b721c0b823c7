pub mod config;
pub mod orchestrator;

pub use config::PhotometryConfig;
pub use orchestrator::{run_photometry, FrameProgress, PipelineOutput};
