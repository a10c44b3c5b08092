pub mod pipeline;

pub use pipeline::{ModernizeReport, NarrationReport, Pipeline, PipelineConfig, estimate_text};
