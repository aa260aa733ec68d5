//! `[Content_Types].xml` manifest

use crate::xml::{start_tag, tokenize, TokenKind};
use crate::{PackageError, Result};

const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Well-known content types for extensions a manifest may be missing
const KNOWN_DEFAULTS: &[(&str, &str)] = &[
    ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("gif", "image/gif"),
    ("emf", "image/x-emf"),
    ("wmf", "image/x-wmf"),
    ("bin", "application/vnd.openxmlformats-officedocument.oleObject"),
];

/// Parsed content type manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentTypes {
    /// Extension -> content type
    pub defaults: Vec<(String, String)>,
    /// Part name (with leading `/`) -> content type
    pub overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Parse the manifest XML
    pub fn parse(xml: &str) -> Result<Self> {
        let mut types = Self::default();

        for token in tokenize(xml)? {
            if !matches!(token.kind, TokenKind::Start | TokenKind::Empty) {
                continue;
            }
            match token.local_name() {
                "Default" => {
                    let ext = token.attribute("Extension");
                    let ct = token.attribute("ContentType");
                    match (ext, ct) {
                        (Some(ext), Some(ct)) => {
                            types.defaults.push((ext.to_string(), ct.to_string()))
                        }
                        _ => return Err(invalid("Default without Extension/ContentType")),
                    }
                }
                "Override" => {
                    let name = token.attribute("PartName");
                    let ct = token.attribute("ContentType");
                    match (name, ct) {
                        (Some(name), Some(ct)) => {
                            types.overrides.push((name.to_string(), ct.to_string()))
                        }
                        _ => return Err(invalid("Override without PartName/ContentType")),
                    }
                }
                _ => {}
            }
        }

        Ok(types)
    }

    /// Content type registered for a part (override first, then extension default)
    pub fn content_type_of(&self, part_name: &str) -> Option<&str> {
        let absolute = absolute_name(part_name);
        if let Some((_, ct)) = self
            .overrides
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&absolute))
        {
            return Some(ct);
        }
        let ext = part_name.rsplit_once('.').map(|(_, ext)| ext)?;
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, ct)| ct.as_str())
    }

    /// Remove the override for a part; returns whether one existed
    pub fn remove_override(&mut self, part_name: &str) -> bool {
        let absolute = absolute_name(part_name);
        let before = self.overrides.len();
        self.overrides
            .retain(|(name, _)| !name.eq_ignore_ascii_case(&absolute));
        before != self.overrides.len()
    }

    /// Bring the manifest in line with the parts actually present
    ///
    /// Overrides for missing parts are dropped and extension defaults are added
    /// for parts that have no content type. Returns whether anything changed.
    pub fn reconcile<'a>(&mut self, part_names: impl IntoIterator<Item = &'a str>) -> bool {
        let names: Vec<&str> = part_names.into_iter().collect();
        let before = self.clone();

        self.overrides.retain(|(name, _)| {
            names
                .iter()
                .any(|part| absolute_name(part).eq_ignore_ascii_case(name))
        });

        for part in &names {
            if *part == crate::CONTENT_TYPES_PART || self.content_type_of(part).is_some() {
                continue;
            }
            let Some((_, ext)) = part.rsplit_once('.') else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if let Some((_, ct)) = KNOWN_DEFAULTS.iter().find(|(e, _)| *e == ext) {
                tracing::debug!(part = *part, content_type = *ct, "adding missing content type default");
                self.defaults.push((ext, ct.to_string()));
            }
        }

        *self != before
    }

    /// Serialize the manifest
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
        xml.push_str(&start_tag(
            "Types",
            &[("xmlns".to_string(), CONTENT_TYPES_NS.to_string())],
            false,
        ));
        for (ext, ct) in &self.defaults {
            xml.push_str(&start_tag(
                "Default",
                &[
                    ("Extension".to_string(), ext.clone()),
                    ("ContentType".to_string(), ct.clone()),
                ],
                true,
            ));
        }
        for (name, ct) in &self.overrides {
            xml.push_str(&start_tag(
                "Override",
                &[
                    ("PartName".to_string(), name.clone()),
                    ("ContentType".to_string(), ct.clone()),
                ],
                true,
            ));
        }
        xml.push_str("</Types>");
        xml
    }
}

fn absolute_name(part_name: &str) -> String {
    if part_name.starts_with('/') {
        part_name.to_string()
    } else {
        format!("/{part_name}")
    }
}

fn invalid(reason: &str) -> PackageError {
    PackageError::InvalidManifest {
        part: crate::CONTENT_TYPES_PART.to_string(),
        reason: reason.to_string(),
    }
}
