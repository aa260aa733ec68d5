//! Word document rendering
//!
//! A Word body is a flowing sequence of paragraphs and tables. Tags live in
//! `<w:t>` run text, and Word freely splits a typed tag over several runs, so
//! each paragraph is first normalized: a tag spread over runs is moved into
//! the run where it starts. Blocks then expand over one of three units:
//!
//! - open and close tag in the same paragraph: only the markup between them
//! - common ancestor is a table row: the whole row
//! - otherwise: the sibling paragraphs/tables from the open tag to the close
//!   tag; a paragraph holding nothing but the tag itself is dropped
//!
//! Image tags become inline drawings whose media parts and relationships are
//! added to the package once the part has rendered.

use crate::directive::{self, check_nesting, has_tags, split_tags, Directive, Piece, Tag};
use crate::image::{MediaRegistry, PartImages};
use crate::model::field_text;
use crate::segment::{self, BlockKind, FieldKind, Item};
use crate::{BoundModel, ReportOptions, Result};
use ooxml_core::xml::{
    element_pairs, escape_text, parent_indices, tokenize, unescape_text, TokenKind, XmlToken,
};
use ooxml_core::{resolve_target, Package};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";
const STORY_RELS: &[&str] = &["/header", "/footer", "/footnotes", "/endnotes"];
const LINE_BREAK: &str = "</w:t><w:br/><w:t xml:space=\"preserve\">";

/// Renders the text-bearing parts of a Word package
pub struct WordRenderer<'o> {
    options: &'o ReportOptions,
}

impl<'o> WordRenderer<'o> {
    /// Create a renderer
    pub fn new(options: &'o ReportOptions) -> Self {
        Self { options }
    }

    /// Main document part followed by its headers, footers and notes
    pub fn story_parts(package: &Package) -> Result<Vec<String>> {
        let document = package
            .relationships("")?
            .entries
            .iter()
            .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_REL))
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_DOCUMENT_PART.to_string());

        let mut parts = vec![document.clone()];
        for rel in package.relationships(&document)?.entries {
            if rel.is_external() || !STORY_RELS.iter().any(|t| rel.rel_type.ends_with(t)) {
                continue;
            }
            let target = resolve_target(&document, &rel.target);
            if package.contains(&target) && !parts.contains(&target) {
                parts.push(target);
            }
        }
        Ok(parts)
    }

    /// Render every story part in place; returns the number of directives expanded
    pub fn render(&self, package: &mut Package, model: &BoundModel) -> Result<usize> {
        let mut parts = Vec::new();
        let mut max_drawing_id = 0;

        for name in Self::story_parts(package)? {
            let xml = package.xml_part(&name)?;
            if !has_tags(&xml) {
                max_drawing_id = max_drawing_id.max(max_drawing_id_in(&xml)?);
                continue;
            }
            let part = WordPart::scan(&name, &xml)?;
            max_drawing_id = max_drawing_id.max(part.max_drawing_id());
            if !part.directives().is_empty() {
                parts.push(part);
            }
        }

        let mut registry = MediaRegistry::new(package, max_drawing_id);
        let mut total = 0;

        for part in parts {
            total += part.directives().len();
            let rel_ids: Vec<String> = package
                .relationships(&part.name)?
                .entries
                .into_iter()
                .map(|rel| rel.id)
                .collect();
            let mut images = PartImages::new(&part.name, rel_ids, &mut registry);

            let rendered = part.render(model, self.options, &mut images)?;
            package.set_part(&part.name, rendered.into_bytes());
            images.commit(package)?;
            tracing::debug!(part = %part.name, directives = part.directives().len(), "rendered word part");
        }

        Ok(total)
    }
}

/// A tag found in a run text token
#[derive(Debug, Clone)]
struct TagRef {
    token: usize,
    tag: Tag,
}

/// How a block tag is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// The marker replaces the tag where it stands
    Inline,
    /// The tag vanishes; markers sit on the expansion unit boundaries
    Removed,
}

#[derive(Default)]
struct Markers {
    before_close: BTreeMap<usize, Vec<Item>>,
    before_open: BTreeMap<usize, Vec<Item>>,
    after_close: BTreeMap<usize, Vec<Item>>,
    after_open: BTreeMap<usize, Vec<Item>>,
}

/// A scanned, normalized Word part
pub struct WordPart {
    name: String,
    source: String,
    tokens: Vec<XmlToken>,
    parents: Vec<Option<usize>>,
    pairs: Vec<Option<usize>>,
    /// Normalized unescaped text for run text tokens
    texts: Vec<Option<String>>,
    /// Run text tokens whose text changed during normalization
    modified: HashSet<usize>,
    tags: Vec<TagRef>,
    directives: Vec<Directive>,
}

impl WordPart {
    /// Tokenize, normalize split tags and scan directives
    pub fn scan(name: &str, xml: &str) -> Result<Self> {
        let tokens = tokenize(xml)?;
        let parents = parent_indices(&tokens);
        let pairs = element_pairs(&tokens);

        let mut part = Self {
            name: name.to_string(),
            source: xml.to_string(),
            texts: vec![None; tokens.len()],
            tokens,
            parents,
            pairs,
            modified: HashSet::new(),
            tags: Vec::new(),
            directives: Vec::new(),
        };
        part.normalize()?;
        part.collect_tags()?;
        Ok(part)
    }

    /// Directives in document order
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Largest `wp:docPr` id already used by the part
    pub fn max_drawing_id(&self) -> u32 {
        drawing_ids(&self.tokens).max().unwrap_or(0)
    }

    fn is_run_text(&self, i: usize) -> bool {
        self.tokens[i].kind == TokenKind::Text
            && self.parents[i].is_some_and(|p| self.tokens[p].is_start("t"))
    }

    fn ancestor(&self, mut i: usize, local: &str) -> Option<usize> {
        while let Some(parent) = self.parents[i] {
            if self.tokens[parent].is_start(local) {
                return Some(parent);
            }
            i = parent;
        }
        None
    }

    /// Start tags enclosing a token, outermost first
    fn ancestors(&self, mut i: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        while let Some(parent) = self.parents[i] {
            chain.push(parent);
            i = parent;
        }
        chain.reverse();
        chain
    }

    /// Move tags split across runs into the run where they start
    fn normalize(&mut self) -> Result<()> {
        let mut groups: Vec<(Option<usize>, Vec<usize>)> = Vec::new();

        for i in 0..self.tokens.len() {
            if !self.is_run_text(i) {
                continue;
            }
            let text = unescape_text(self.tokens[i].raw(&self.source))?.into_owned();
            self.texts[i] = Some(text);

            let paragraph = self.ancestor(i, "p");
            match groups.last_mut() {
                Some((p, members)) if paragraph.is_some() && *p == paragraph => members.push(i),
                _ => groups.push((paragraph, vec![i])),
            }
        }

        for (_, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let joined: String = members
                .iter()
                .filter_map(|&i| self.texts[i].as_deref())
                .collect();
            if !has_tags(&joined) {
                continue;
            }

            // Byte owner of every character of the joined paragraph text
            let mut owner: Vec<usize> = Vec::with_capacity(joined.len());
            for (slot, &i) in members.iter().enumerate() {
                let len = self.texts[i].as_ref().map_or(0, String::len);
                owner.extend(std::iter::repeat(slot).take(len));
            }

            let mut moved = false;
            for piece in split_tags(&joined) {
                if let Piece::Tag { start, end, .. } = piece {
                    let first = owner[start];
                    if owner[end - 1] != first {
                        owner[start..end].iter_mut().for_each(|o| *o = first);
                        moved = true;
                    }
                }
            }
            if !moved {
                continue;
            }

            let mut rebuilt = vec![String::new(); members.len()];
            for (pos, ch) in joined.char_indices() {
                rebuilt[owner[pos]].push(ch);
            }
            for (slot, text) in rebuilt.into_iter().enumerate() {
                let i = members[slot];
                if self.texts[i].as_deref() != Some(text.as_str()) {
                    self.modified.insert(i);
                    self.texts[i] = Some(text);
                }
            }
        }

        Ok(())
    }

    fn collect_tags(&mut self) -> Result<()> {
        let mut texts = Vec::new();
        for (i, text) in self.texts.iter().enumerate() {
            let Some(text) = text else {
                continue;
            };
            if !has_tags(text) {
                continue;
            }
            for piece in split_tags(text) {
                if let Piece::Tag { tag, .. } = piece {
                    self.tags.push(TagRef { token: i, tag });
                }
            }
            texts.push((self.tokens[i].span.start, text.as_str()));
        }

        self.directives = directive::scan_texts(&self.name, texts)?;
        Ok(())
    }

    /// True if the paragraph holds exactly one tag and otherwise only whitespace
    fn is_tag_only_paragraph(&self, paragraph: usize) -> bool {
        let Some(end) = self.pairs[paragraph] else {
            return false;
        };
        let mut tags = 0;
        for i in paragraph..end {
            let Some(text) = &self.texts[i] else {
                continue;
            };
            for piece in split_tags(text) {
                match piece {
                    Piece::Tag { .. } => tags += 1,
                    Piece::Text(t) if !t.trim().is_empty() => return false,
                    Piece::Text(_) => {}
                }
            }
        }
        tags == 1
    }

    /// Decide the expansion unit of every block
    fn place_blocks(&self) -> Result<(Vec<Placement>, Markers, Vec<bool>)> {
        let mut placements = vec![Placement::Inline; self.tags.len()];
        let mut markers = Markers::default();
        let mut skip = vec![false; self.tokens.len()];

        let mut pairs = check_nesting(&self.name, &self.directives)?;
        pairs.sort_by_key(|&(open, _)| open);

        for (open, close) in pairs {
            let (open_token, close_token) = (self.tags[open].token, self.tags[close].token);
            let paragraph_open = self.ancestor(open_token, "p");
            let paragraph_close = self.ancestor(close_token, "p");
            if paragraph_open == paragraph_close {
                continue;
            }

            let chain_open = self.ancestors(open_token);
            let chain_close = self.ancestors(close_token);
            let depth = chain_open
                .iter()
                .zip(&chain_close)
                .take_while(|(a, b)| a == b)
                .count();
            if depth == 0 || depth >= chain_open.len() || depth >= chain_close.len() {
                return Err(directive::malformed(
                    &self.name,
                    format!("block '{}' spans unrelated elements", self.tags[open].tag.path),
                ));
            }
            let common = chain_open[depth - 1];

            let tag = &self.tags[open].tag;
            let kind = BlockKind::of(tag).unwrap_or(BlockKind::Repeat);
            let open_item = Item::Open {
                kind,
                path: tag.path.clone(),
            };
            let close_item = Item::Close {
                path: tag.path.clone(),
            };

            if self.tokens[common].is_start("tr") {
                let end = self.element_end(common)?;
                markers.before_open.entry(common).or_default().push(open_item);
                markers.after_close.entry(end).or_default().insert(0, close_item);
            } else {
                let child_open = chain_open[depth];
                let child_close = chain_close[depth];

                if self.tokens[child_open].is_start("p") && self.is_tag_only_paragraph(child_open)
                {
                    let end = self.element_end(child_open)?;
                    skip[child_open..=end].iter_mut().for_each(|s| *s = true);
                    markers.after_open.entry(end).or_default().push(open_item);
                } else {
                    markers
                        .before_open
                        .entry(child_open)
                        .or_default()
                        .push(open_item);
                }

                if self.tokens[child_close].is_start("p")
                    && self.is_tag_only_paragraph(child_close)
                {
                    let end = self.element_end(child_close)?;
                    skip[child_close..=end].iter_mut().for_each(|s| *s = true);
                    markers
                        .before_close
                        .entry(child_close)
                        .or_default()
                        .insert(0, close_item);
                } else {
                    let end = self.element_end(child_close)?;
                    markers.after_close.entry(end).or_default().insert(0, close_item);
                }
            }

            placements[open] = Placement::Removed;
            placements[close] = Placement::Removed;
        }

        Ok((placements, markers, skip))
    }

    fn element_end(&self, start: usize) -> Result<usize> {
        self.pairs[start].ok_or_else(|| {
            directive::malformed(
                &self.name,
                format!("unterminated element <{}>", self.tokens[start].qname),
            )
        })
    }

    /// Flatten the part into an item stream
    fn items(&self) -> Result<Vec<Item>> {
        let (placements, mut markers, skip) = self.place_blocks()?;

        // w:t elements that carry a tag or changed text keep their spaces
        let preserve: HashSet<usize> = (0..self.tokens.len())
            .filter(|&i| {
                self.modified.contains(&i)
                    || self.texts[i].as_deref().is_some_and(has_tags)
            })
            .filter_map(|i| self.parents[i])
            .collect();

        let mut items = Vec::with_capacity(self.tokens.len());
        let mut next_tag = 0;

        for (i, token) in self.tokens.iter().enumerate() {
            items.extend(markers.before_close.remove(&i).unwrap_or_default());
            items.extend(markers.before_open.remove(&i).unwrap_or_default());

            let text = self.texts[i].as_deref();
            let tagged = text.is_some_and(has_tags);

            if tagged {
                for piece in split_tags(text.unwrap_or_default()) {
                    match piece {
                        Piece::Text(t) if !skip[i] => items.push(Item::Raw(escape_text(t).into_owned())),
                        Piece::Text(_) => {}
                        Piece::Tag { tag, .. } => {
                            let placement = placements[next_tag];
                            next_tag += 1;
                            if skip[i] || placement == Placement::Removed {
                                continue;
                            }
                            items.push(Item::of(tag));
                        }
                    }
                }
            } else if !skip[i] {
                let raw = if self.modified.contains(&i) {
                    escape_text(text.unwrap_or_default()).into_owned()
                } else if preserve.contains(&i) && token.attribute("xml:space").is_none() {
                    let mut tag = token.clone();
                    tag.set_attribute("xml:space", "preserve");
                    tag.to_tag()
                } else {
                    token.raw(&self.source).to_string()
                };
                items.push(Item::Raw(raw));
            }

            items.extend(markers.after_close.remove(&i).unwrap_or_default());
            items.extend(markers.after_open.remove(&i).unwrap_or_default());
        }

        Ok(items)
    }

    /// Expand directives against the model
    ///
    /// Image values that cannot be embedded are logged and render blank.
    pub fn render(
        &self,
        model: &BoundModel,
        options: &ReportOptions,
        images: &mut PartImages<'_>,
    ) -> Result<String> {
        let segments = segment::build(&self.name, self.items()?)?;

        let line_breaks = options.line_breaks;
        let mut field = |kind: FieldKind, value: Option<&Value>, out: &mut String| {
            let Some(value) = value else {
                return;
            };
            if kind == FieldKind::Image {
                match images.place(value) {
                    Ok(markup) => out.push_str(&markup),
                    Err(e) => tracing::warn!(part = %self.name, error = %e, "skipping image"),
                }
                return;
            }
            let text = field_text(value);
            if line_breaks && text.contains('\n') {
                for (n, line) in text.split('\n').enumerate() {
                    if n > 0 {
                        out.push_str(LINE_BREAK);
                    }
                    out.push_str(&escape_text(line.trim_end_matches('\r')));
                }
            } else {
                out.push_str(&escape_text(&text));
            }
        };

        let mut scope = model.scope();
        let mut out = String::with_capacity(self.source.len());
        segment::render(&segments, &mut scope, &mut out, &mut field);
        Ok(out)
    }
}

fn drawing_ids(tokens: &[XmlToken]) -> impl Iterator<Item = u32> + '_ {
    tokens
        .iter()
        .filter(|t| t.opens("docPr"))
        .filter_map(|t| t.attribute("id")?.parse().ok())
}

fn max_drawing_id_in(xml: &str) -> Result<u32> {
    if !xml.contains("docPr") {
        return Ok(0);
    }
    Ok(drawing_ids(&tokenize(xml)?).max().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const HEAD: &str = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;
    const TAIL: &str = "</w:body></w:document>";

    fn doc(body: &str) -> String {
        format!("{HEAD}{body}{TAIL}")
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    }

    fn render(body: &str, model: serde_json::Value) -> String {
        let xml = doc(body);
        let part = WordPart::scan("word/document.xml", &xml).unwrap();
        let mut registry = MediaRegistry::new(&Package::default(), 0);
        let mut images = PartImages::new("word/document.xml", Vec::<String>::new(), &mut registry);
        let rendered = part
            .render(&BoundModel::from_value(model), &ReportOptions::default(), &mut images)
            .unwrap();
        rendered
            .strip_prefix(HEAD)
            .and_then(|s| s.strip_suffix(TAIL))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_field_substitution_keeps_formatting() {
        let body = r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Dear {{name}}!</w:t></w:r></w:p>"#;
        let out = render(body, json!({ "name": "Ann & Bob" }));
        assert_eq!(
            out,
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Dear Ann &amp; Bob!</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_tag_split_across_runs() {
        let body = r#"<w:p><w:r><w:t>Hello {{na</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>me}} there</w:t></w:r></w:p>"#;
        let out = render(body, json!({ "name": "World" }));
        assert_eq!(
            out,
            r#"<w:p><w:r><w:t xml:space="preserve">Hello World</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"> there</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_missing_field_renders_blank() {
        let out = render(&para("[{{nothing.here}}]"), json!({}));
        assert_eq!(out, r#"<w:p><w:r><w:t xml:space="preserve">[]</w:t></w:r></w:p>"#);
    }

    #[test]
    fn test_inline_repeat() {
        let out = render(
            &para("{{#tags}}{{.}};{{/tags}}"),
            json!({ "tags": ["a", "b", "c"] }),
        );
        assert_eq!(out, r#"<w:p><w:r><w:t xml:space="preserve">a;b;c;</w:t></w:r></w:p>"#);
    }

    #[test]
    fn test_paragraph_loop_drops_tag_paragraphs() {
        let body = format!(
            "{}{}{}{}",
            para("{{#items}}"),
            para("Item {{name}}"),
            para("{{/items}}"),
            para("End")
        );
        let out = render(&body, json!({ "items": [{ "name": "A" }, { "name": "B" }] }));
        assert_eq!(
            out,
            format!(
                "{}{}{}",
                r#"<w:p><w:r><w:t xml:space="preserve">Item A</w:t></w:r></w:p>"#,
                r#"<w:p><w:r><w:t xml:space="preserve">Item B</w:t></w:r></w:p>"#,
                para("End")
            )
        );
    }

    #[test]
    fn test_table_row_repeat() {
        let body = concat!(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc></w:tr>",
            "<w:tr><w:tc><w:p><w:r><w:t>{{#rows}}{{name}}</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>{{qty}}{{/rows}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"
        );
        let out = render(
            body,
            json!({ "rows": [{ "name": "x", "qty": 1 }, { "name": "y", "qty": 2 }, { "name": "z", "qty": 3 }] }),
        );
        assert_eq!(out.matches("<w:tr>").count(), 4);
        let x = out.find(">x<").unwrap();
        let y = out.find(">y<").unwrap();
        let z = out.find(">z<").unwrap();
        assert!(x < y && y < z);
        assert!(out.contains(">3<"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_conditional_removes_range() {
        let body = format!("{}{}{}", para("{{?show}}"), para("Secret"), para("{{/show}}"));
        assert_eq!(render(&body, json!({ "show": false })), "");
        assert_eq!(render(&body, json!({})), "");
        assert_eq!(
            render(&body, json!({ "show": true })),
            para("Secret")
        );
    }

    #[test]
    fn test_inverted_conditional() {
        let out = render(&para("{{^items}}No items{{/items}}"), json!({ "items": [] }));
        assert_eq!(out, r#"<w:p><w:r><w:t xml:space="preserve">No items</w:t></w:r></w:p>"#);
    }

    #[test]
    fn test_line_breaks() {
        let out = render(&para("{{address}}"), json!({ "address": "1 Road\nTown" }));
        assert_eq!(
            out,
            r#"<w:p><w:r><w:t xml:space="preserve">1 Road</w:t><w:br/><w:t xml:space="preserve">Town</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_unclosed_block_is_malformed() {
        let xml = doc(&para("{{#items}} never closed"));
        let err = WordPart::scan("word/document.xml", &xml)
            .err()
            .expect("scan should fail");
        assert!(matches!(err, ReportError::MalformedTemplate { .. }));
    }

    /// Package whose document holds `body` and an existing picture with docPr id 3
    fn picture_package(body: &str) -> Package {
        let existing = r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="3" name="Old"/></wp:inline></w:drawing></w:r></w:p>"#;
        let mut package = Package::default();
        package.set_part("word/document.xml", doc(&format!("{existing}{body}")).into_bytes());
        package
    }

    #[test]
    fn test_image_tag_embeds_media() {
        let mut package = picture_package(&para("Logo: {{%logo}}"));
        let model = BoundModel::from_value(json!({ "logo": crate::image::tests::png_base64(8, 4) }));
        let options = ReportOptions::default();
        assert_eq!(WordRenderer::new(&options).render(&mut package, &model).unwrap(), 1);

        let xml = package.xml_part("word/document.xml").unwrap();
        assert!(xml.contains(r#"<w:t xml:space="preserve">Logo: </w:t><w:drawing>"#));
        assert!(xml.contains(r#"<wp:extent cx="76200" cy="38100"/><wp:docPr id="4" name="Picture 4"/>"#));
        assert!(xml.contains(r#"r:embed="rId1""#));
        assert!(xml.contains(r#"</w:drawing><w:t xml:space="preserve"></w:t>"#));
        assert!(tokenize(&xml).is_ok());

        assert!(package.contains("word/media/report_image1.png"));
        let rels = package.relationships("word/document.xml").unwrap();
        assert_eq!(rels.get("rId1").unwrap().target, "media/report_image1.png");
    }

    #[test]
    fn test_unusable_image_renders_blank() {
        let mut package = picture_package(&format!("{}{}", para("A{{%logo}}B"), para("C{{%missing}}D")));
        let model = BoundModel::from_value(json!({ "logo": "bm90IGFuIGltYWdl" }));
        let options = ReportOptions::default();
        WordRenderer::new(&options).render(&mut package, &model).unwrap();

        let xml = package.xml_part("word/document.xml").unwrap();
        assert!(xml.contains(r#"<w:t xml:space="preserve">AB</w:t>"#));
        assert!(xml.contains(r#"<w:t xml:space="preserve">CD</w:t>"#));
        assert_eq!(xml.matches("<w:drawing>").count(), 1);
        assert!(!package.part_names().any(|name| name.starts_with("word/media/")));
        assert!(!package.contains("word/_rels/document.xml.rels"));
    }

    #[test]
    fn test_directives_in_document_order() {
        let xml = doc(&format!("{}{}", para("{{a}}"), para("{{#b}}{{c}}{{/b}}")));
        let part = WordPart::scan("word/document.xml", &xml).unwrap();
        let paths: Vec<&str> = part.directives().iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b", "c", "b"]);
    }
}
