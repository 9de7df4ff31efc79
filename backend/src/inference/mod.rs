pub mod config;
pub mod error;
pub mod executor;
pub mod labels;
pub mod normalizer;
pub mod pipeline;
pub mod registry;
pub mod staging;
#[cfg(feature = "torch")]
pub mod torch;
pub mod translator;

pub use error::{ClassifyError, StartupError};
pub use pipeline::Pipeline;
pub use registry::ModelRegistry;
