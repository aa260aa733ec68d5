//! OOXML Core - Low-level Office Open XML package handling
//!
//! This crate provides functionality for:
//! - Opening and saving zip-based OPC packages (DOCX, XLSX)
//! - Reading and editing `[Content_Types].xml` and `.rels` manifests
//! - Tokenizing XML parts while keeping their original bytes
//! - A1 cell reference arithmetic
//!
//! # Example
//!
//! ```ignore
//! use ooxml_core::Package;
//!
//! let mut package = Package::open("template.xlsx")?;
//! let sheet = package.xml_part("xl/worksheets/sheet1.xml")?;
//! package.set_part("xl/worksheets/sheet1.xml", sheet.replace("foo", "bar").into_bytes());
//! let bytes = package.to_bytes()?;
//! ```

mod cell_ref;
mod content_types;
mod package;
mod relationships;
pub mod xml;

pub use cell_ref::{column_index, column_name, CellRange, CellRef};
pub use content_types::ContentTypes;
pub use package::{Compression, Package, Part, CONTENT_TYPES_PART, ROOT_RELS_PART};
pub use relationships::{
    rels_part_for, resolve_target, source_part_for, Relationship, Relationships,
};

use thiserror::Error;

/// Errors that can occur during package operations
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Invalid package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Missing required package part: {0}")]
    MissingPart(String),

    #[error("Part is not valid UTF-8 XML: {0}")]
    InvalidEncoding(String),

    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid manifest {part}: {reason}")]
    InvalidManifest { part: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for package operations
pub type Result<T> = std::result::Result<T, PackageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_part_message() {
        let err = PackageError::MissingPart("[Content_Types].xml".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required package part: [Content_Types].xml"
        );
    }
}
