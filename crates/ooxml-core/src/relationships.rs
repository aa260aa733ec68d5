//! Package relationship (`.rels`) parts

use crate::xml::{start_tag, tokenize, TokenKind};
use crate::{PackageError, Result};

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// A single relationship entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// `External` for links outside the package
    pub target_mode: Option<String>,
}

impl Relationship {
    /// True if the target lives outside the package
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

/// Parsed relationship part
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    pub entries: Vec<Relationship>,
}

impl Relationships {
    /// Parse a `.rels` part
    pub fn parse(part_name: &str, xml: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for token in tokenize(xml)? {
            if !matches!(token.kind, TokenKind::Start | TokenKind::Empty)
                || token.local_name() != "Relationship"
            {
                continue;
            }
            let (Some(id), Some(rel_type), Some(target)) = (
                token.attribute("Id"),
                token.attribute("Type"),
                token.attribute("Target"),
            ) else {
                return Err(PackageError::InvalidManifest {
                    part: part_name.to_string(),
                    reason: "Relationship without Id/Type/Target".to_string(),
                });
            };
            entries.push(Relationship {
                id: id.to_string(),
                rel_type: rel_type.to_string(),
                target: target.to_string(),
                target_mode: token.attribute("TargetMode").map(str::to_string),
            });
        }

        Ok(Self { entries })
    }

    /// Find a relationship by id
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|rel| rel.id == id)
    }

    /// Remove every internal relationship of `source_part` whose target resolves
    /// to `target_part`; returns the number removed
    pub fn remove_targeting(&mut self, source_part: &str, target_part: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|rel| {
            rel.is_external() || resolve_target(source_part, &rel.target) != target_part
        });
        before - self.entries.len()
    }

    /// Serialize the part
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
        xml.push_str(&start_tag(
            "Relationships",
            &[("xmlns".to_string(), RELATIONSHIPS_NS.to_string())],
            false,
        ));
        for rel in &self.entries {
            let mut attributes = vec![
                ("Id".to_string(), rel.id.clone()),
                ("Type".to_string(), rel.rel_type.clone()),
                ("Target".to_string(), rel.target.clone()),
            ];
            if let Some(mode) = &rel.target_mode {
                attributes.push(("TargetMode".to_string(), mode.clone()));
            }
            xml.push_str(&start_tag("Relationship", &attributes, true));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

/// Name of the relationship part that belongs to `part_name`
///
/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`, and the package root
/// (empty name) -> `_rels/.rels`.
pub fn rels_part_for(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Source part a relationship part describes (inverse of [`rels_part_for`])
pub fn source_part_for(rels_part: &str) -> Option<String> {
    let file = rels_part.strip_suffix(".rels")?;
    let (dir, file) = match file.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => return None,
    };
    let dir = dir.strip_suffix("_rels")?.trim_end_matches('/');
    if dir.is_empty() {
        Some(file.to_string())
    } else {
        Some(format!("{dir}/{file}"))
    }
}

/// Resolve a relationship target relative to its source part
///
/// Returns a package part name without the leading `/`.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
