pub mod analysis;
pub mod config;
pub mod error;
pub mod inference;
pub mod ocr;
pub mod pipeline;
pub mod recognizer;
pub mod render;
pub mod report;
pub mod text;

// Re-export commonly used types
pub use config::RedactorConfig;
pub use error::RedactError;
pub use pipeline::{RedactionOutput, Redactor};
pub use render::{RedactionConfig, RedactionMode, RedactionRenderer};
pub use report::Report;
