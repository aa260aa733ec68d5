//! Report Template - DOCX/XLSX report rendering from JSON models
//!
//! This crate provides:
//! - Template lookup on a configured storage root
//! - JSON model binding with dotted/indexed path resolution
//! - Directive scanning (fields, images, repeating blocks, conditionals, chart ranges)
//! - Word body rendering and per-sheet Excel rendering with row expansion
//! - Images embedded into Word documents from Base64 model values
//! - Result encoding (bytes + Base64, or collected error messages)
//!
//! # Example
//!
//! ```ignore
//! use report_template::{RenderInput, ReportEngine, ReportKind, ReportOptions};
//!
//! let options = ReportOptions::from_file("reportOptions.json")?;
//! let engine = ReportEngine::new(options);
//! let input = RenderInput {
//!     json_model: std::fs::read_to_string("model.json")?,
//!     template_name: "SimpleReport".to_string(),
//!     report_name: "report.xlsx".to_string(),
//!     ..Default::default()
//! };
//! let output = engine.render(ReportKind::Excel, &input);
//! if output.has_errors() {
//!     eprintln!("{:?}", output.error_messages());
//! }
//! ```

pub mod directive;
mod engine;
pub mod excel;
pub mod image;
pub mod model;
mod options;
mod output;
pub mod segment;
mod store;
pub mod word;

pub use engine::{RenderInput, ReportEngine};
pub use excel::SheetSelection;
pub use model::{BoundModel, Scope};
pub use options::ReportOptions;
pub use output::{RenderedDocumentOutput, ReportFile};
pub use store::{ReportKind, TemplateBytes, TemplateStore};

use thiserror::Error;

/// Errors that can occur while rendering a report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid Report Template: {expected_file_name}")]
    TemplateNotFound { expected_file_name: String },

    #[error("Failed to read report template {path}: {source}")]
    TemplateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON model at line {line}, column {column}: {message}")]
    ModelParse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Malformed template part {part}: {reason}")]
    MalformedTemplate { part: String, reason: String },

    #[error("Invalid sheet number {sheet}: template has {available} sheet(s)")]
    InvalidSheet { sheet: u32, available: usize },

    #[error("Failed to assemble report: {0}")]
    Assembly(String),

    #[error("Invalid options: {0}")]
    Options(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Failed to assemble report: {0}")]
    Package(#[from] ooxml_core::PackageError),
}

impl ReportError {
    /// Human-readable message with the template file attached where the
    /// error itself does not already name it
    pub fn message_for(&self, template_file: &str) -> String {
        match self {
            ReportError::TemplateNotFound { .. }
            | ReportError::TemplateRead { .. }
            | ReportError::ModelParse { .. } => self.to_string(),
            _ => format!("{template_file}: {self}"),
        }
    }
}

/// Result type for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_not_found_message() {
        let err = ReportError::TemplateNotFound {
            expected_file_name: "/srv/templates/INVALID_NAME.xlsx".to_string(),
        };
        let message = err.message_for("INVALID_NAME.xlsx");
        assert!(message.contains("Invalid Report Template"));
        assert!(message.contains("INVALID_NAME.xlsx"));
    }

    #[test]
    fn test_message_names_template() {
        let err = ReportError::InvalidSheet {
            sheet: 4,
            available: 2,
        };
        assert_eq!(
            err.message_for("Campaign.xlsx"),
            "Campaign.xlsx: Invalid sheet number 4: template has 2 sheet(s)"
        );
    }
}
