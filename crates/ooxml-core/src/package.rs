//! OPC package wrapper

use crate::relationships::{rels_part_for, source_part_for};
use crate::{ContentTypes, PackageError, Relationships, Result};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the content type manifest part
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Name of the package-level relationship part
pub const ROOT_RELS_PART: &str = "_rels/.rels";

/// Compression used for a zip entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Deflated,
}

impl Compression {
    fn from_method(method: CompressionMethod) -> Self {
        match method {
            CompressionMethod::Stored => Compression::Stored,
            _ => Compression::Deflated,
        }
    }

    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

/// A named part of the package
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Part name without leading `/` (e.g. `word/document.xml`)
    pub name: String,
    /// Uncompressed content
    pub data: Vec<u8>,
    /// Compression of the original zip entry
    pub compression: Compression,
}

/// In-memory OPC package
///
/// Parts keep their original order and compression so a re-saved package
/// stays as close to the source archive as possible.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: Vec<Part>,
}

impl Package {
    /// Open a package from a file path
    ///
    /// # Example
    /// ```ignore
    /// let package = Package::open("template.docx")?;
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Open a package from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let compression = Compression::from_method(entry.compression());
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            parts.push(Part {
                name,
                data,
                compression,
            });
        }

        tracing::debug!(parts = parts.len(), "opened package");
        Ok(Self { parts })
    }

    /// Part names in archive order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// Check whether a part exists
    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.name == name)
    }

    /// Raw content of a part
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.data.as_slice())
    }

    /// Content of an XML part as text
    ///
    /// Fails with [`PackageError::MissingPart`] if the part does not exist.
    pub fn xml_part(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))?;
        let text = std::str::from_utf8(data)
            .map_err(|_| PackageError::InvalidEncoding(name.to_string()))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    /// Replace a part's content, or append a new deflated part
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|p| p.name == name) {
            Some(part) => part.data = data,
            None => self.parts.push(Part {
                name: name.to_string(),
                data,
                compression: Compression::Deflated,
            }),
        }
    }

    /// Remove a part; returns whether it existed
    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.name != name);
        before != self.parts.len()
    }

    /// Remove a part together with everything that points at it
    ///
    /// Drops the part's own relationship part, its content type override and
    /// every relationship in the package that targets it.
    pub fn remove_part_and_references(&mut self, name: &str) -> Result<bool> {
        if !self.remove_part(name) {
            return Ok(false);
        }
        self.remove_part(&rels_part_for(name));

        if self.contains(crate::CONTENT_TYPES_PART) {
            let mut types = self.content_types()?;
            if types.remove_override(name) {
                self.set_part(crate::CONTENT_TYPES_PART, types.to_xml().into_bytes());
            }
        }

        let rels_parts: Vec<String> = self
            .part_names()
            .filter(|n| n.ends_with(".rels"))
            .map(str::to_string)
            .collect();
        for rels_part in rels_parts {
            let Some(source) = source_part_for(&rels_part) else {
                continue;
            };
            let xml = self.xml_part(&rels_part)?;
            let mut rels = Relationships::parse(&rels_part, &xml)?;
            if rels.remove_targeting(&source, name) > 0 {
                tracing::debug!(part = name, rels = %rels_part, "removed relationship to dropped part");
                self.set_part(&rels_part, rels.to_xml().into_bytes());
            }
        }

        Ok(true)
    }

    /// Parsed content type manifest
    pub fn content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(&self.xml_part(CONTENT_TYPES_PART)?)
    }

    /// Relationships of a source part; empty if the part has none
    pub fn relationships(&self, source_part: &str) -> Result<Relationships> {
        let rels_part = rels_part_for(source_part);
        if !self.contains(&rels_part) {
            return Ok(Relationships::default());
        }
        Relationships::parse(&rels_part, &self.xml_part(&rels_part)?)
    }

    /// Serialize the package to zip bytes
    ///
    /// Both manifests must be present. Content type overrides for parts that
    /// no longer exist are dropped. Entry timestamps are fixed so equal
    /// packages produce equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        for required in [CONTENT_TYPES_PART, ROOT_RELS_PART] {
            if !self.contains(required) {
                return Err(PackageError::MissingPart(required.to_string()));
            }
        }

        let mut types = self.content_types()?;
        let manifest = if types.reconcile(self.part_names()) {
            Some(types.to_xml().into_bytes())
        } else {
            None
        };

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            let options = FileOptions::default()
                .compression_method(part.compression.method())
                .last_modified_time(zip::DateTime::default());
            writer.start_file(part.name.as_str(), options)?;

            let data = match (&manifest, part.name.as_str()) {
                (Some(manifest), CONTENT_TYPES_PART) => manifest.as_slice(),
                _ => part.data.as_slice(),
            };
            writer.write_all(data)?;
        }

        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}
