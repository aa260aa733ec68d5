//! Worksheet rendering
//!
//! Tags live in cell text (shared or inline strings). A block whose open and
//! close tags sit in the same cell is expanded inside that cell; a block
//! spanning cells repeats whole rows, from the row of its open tag to the
//! row of its close tag. Every later row moves down (or up) accordingly and
//! the resulting [`RowMap`] drives the rewrite of everything that names a row.

use super::rows::{
    clamp_row, shift_formula, CopyFrame, CopyMapping, ExpandedBlock, RowMap, RowMapping,
};
use super::workbook::inside;
use crate::directive::{self, malformed, split_tags, Directive, DirectiveKind, Piece};
use crate::model::{field_text, Scope};
use crate::segment::{self, BlockKind, FieldKind, Item, Segment};
use crate::{BoundModel, Result};
use ooxml_core::xml::{
    element_pairs, escape_text, parent_indices, tokenize, unescape_text, TokenKind, XmlToken,
};
use ooxml_core::{CellRange, CellRef};
use serde_json::Value;
use std::ops::Range;

/// Attributes holding cell ranges outside `sheetData`
const RANGE_ATTRIBUTES: &[(&str, &str)] = &[
    ("dimension", "ref"),
    ("conditionalFormatting", "sqref"),
    ("dataValidation", "sqref"),
    ("hyperlink", "ref"),
    ("autoFilter", "ref"),
    ("protectedRange", "sqref"),
];

/// Elements whose text is a formula outside `sheetData`
const FORMULA_ELEMENTS: &[&str] = &["formula", "formula1", "formula2"];

/// Output of a rendered worksheet
#[derive(Debug, Clone)]
pub struct RenderedSheet {
    pub xml: String,
    pub map: RowMap,
}

/// Piece of cell markup
#[derive(Debug, Clone)]
enum Chunk {
    Raw(String),
    /// `<f>` start tag; its `ref` attribute names rows
    FormulaTag { raw: String, token: XmlToken },
    /// Formula text
    Formula { raw: String, text: String },
}

#[derive(Debug)]
struct TemplateCell {
    token: XmlToken,
    raw_start: String,
    raw_end: Option<String>,
    reference: Option<CellRef>,
    inner: Vec<Chunk>,
    /// Tagged text of the cell
    text: Option<String>,
    /// Inline content once row-level tags are taken out
    content: Option<Vec<Segment>>,
}

#[derive(Debug)]
struct TemplateRow {
    number: u32,
    token: XmlToken,
    raw_start: String,
    raw_end: Option<String>,
    cells: Vec<TemplateCell>,
    /// Non-cell children, kept verbatim
    extra: String,
}

/// Row-level block tree
#[derive(Debug)]
enum RowSeg {
    Row(usize),
    Block {
        kind: BlockKind,
        path: String,
        first: u32,
        last: u32,
        body: Vec<RowSeg>,
    },
}

/// How a tag is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Expanded inside its own cell
    Inline,
    /// Opens a row block
    RowOpen,
    /// Closes a row block
    RowClose,
}

/// A rendered row waiting for the final row map
struct OutRow {
    origin: u32,
    number: u32,
    frames: Vec<CopyFrame>,
    /// Produced by a second or later iteration of some enclosing block
    repeated: bool,
    chunks: Vec<Chunk>,
}

#[derive(Default)]
struct Walk {
    delta: i64,
    frames: Vec<CopyFrame>,
    /// Enclosing blocks currently past their first iteration
    repeats: usize,
    rows: Vec<OutRow>,
    blocks: Vec<ExpandedBlock>,
}

/// A scanned worksheet
pub struct SheetTemplate {
    part: String,
    name: String,
    source: String,
    tokens: Vec<XmlToken>,
    parents: Vec<Option<usize>>,
    pairs: Vec<Option<usize>>,
    /// Token range of `sheetData`, inclusive of its start and end tags
    data: Option<Range<usize>>,
    rows: Vec<TemplateRow>,
    tree: Vec<RowSeg>,
    directives: Vec<Directive>,
}

impl SheetTemplate {
    /// Parse a worksheet and scan its tags
    pub fn scan(part: &str, name: &str, xml: &str, shared_strings: &[String]) -> Result<Self> {
        let tokens = tokenize(xml)?;
        let parents = parent_indices(&tokens);
        let pairs = element_pairs(&tokens);

        let data = tokens.iter().position(|t| t.opens("sheetData")).map(|start| {
            let end = pairs[start].unwrap_or(start);
            start..end + 1
        });

        let mut sheet = Self {
            part: part.to_string(),
            name: name.to_string(),
            source: xml.to_string(),
            tokens,
            parents,
            pairs,
            data,
            rows: Vec::new(),
            tree: Vec::new(),
            directives: Vec::new(),
        };
        sheet.parse_rows(shared_strings)?;
        sheet.assign_roles()?;
        Ok(sheet)
    }

    /// Directives found in cell text, in row/column order
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    fn parse_rows(&mut self, shared_strings: &[String]) -> Result<()> {
        let Some(data) = self.data.clone() else {
            return Ok(());
        };
        let mut last_number = 0;
        let mut i = data.start + 1;

        while i + 1 < data.end {
            let token = &self.tokens[i];
            if !token.opens("row") {
                i += 1;
                continue;
            }
            let end = self.element_end(i)?;
            let number = token
                .attribute("r")
                .and_then(|r| r.parse().ok())
                .unwrap_or(last_number + 1);

            let mut cells = Vec::new();
            let mut extra = String::new();
            let mut j = i + 1;
            while j < end {
                if self.tokens[j].opens("c") {
                    let cell_end = self.element_end(j)?;
                    cells.push(self.parse_cell(j, cell_end, shared_strings)?);
                    j = cell_end + 1;
                } else {
                    extra.push_str(self.tokens[j].raw(&self.source));
                    j += 1;
                }
            }

            self.rows.push(TemplateRow {
                number,
                token: token.clone(),
                raw_start: token.raw(&self.source).to_string(),
                raw_end: (end > i).then(|| self.tokens[end].raw(&self.source).to_string()),
                cells,
                extra,
            });
            last_number = number;
            i = end + 1;
        }
        Ok(())
    }

    /// End token of an element (the token itself for empty elements)
    fn element_end(&self, start: usize) -> Result<usize> {
        match self.tokens[start].kind {
            TokenKind::Empty => Ok(start),
            _ => self.pairs[start].ok_or_else(|| {
                malformed(
                    &self.part,
                    format!("unterminated element <{}>", self.tokens[start].qname),
                )
            }),
        }
    }

    fn parse_cell(&self, start: usize, end: usize, shared_strings: &[String]) -> Result<TemplateCell> {
        let token = &self.tokens[start];
        let cell_type = token.attribute("t").unwrap_or("n");
        let mut inner = Vec::new();
        let mut text: Option<String> = None;

        for k in start + 1..end {
            let t = &self.tokens[k];
            let raw = t.raw(&self.source);
            let parent = self.parents[k].map(|p| &self.tokens[p]);

            if t.is_start("f") {
                inner.push(Chunk::FormulaTag {
                    raw: raw.to_string(),
                    token: t.clone(),
                });
                continue;
            }
            if t.kind == TokenKind::Text {
                let unescaped = unescape_text(raw)?;
                match (cell_type, parent) {
                    (_, Some(p)) if p.is_start("f") => {
                        inner.push(Chunk::Formula {
                            raw: raw.to_string(),
                            text: unescaped.into_owned(),
                        });
                        continue;
                    }
                    ("s", Some(p)) if p.is_start("v") => {
                        text = unescaped
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|index| shared_strings.get(index).cloned());
                    }
                    ("inlineStr", Some(p))
                        if p.is_start("t") && !inside(&self.tokens, &self.parents, k, "rPh") =>
                    {
                        text.get_or_insert_with(String::new).push_str(&unescaped);
                    }
                    _ => {}
                }
            }
            inner.push(Chunk::Raw(raw.to_string()));
        }

        Ok(TemplateCell {
            token: token.clone(),
            raw_start: token.raw(&self.source).to_string(),
            raw_end: (end > start).then(|| self.tokens[end].raw(&self.source).to_string()),
            reference: token.attribute("r").and_then(|r| r.parse().ok()),
            inner,
            text: text.filter(|t| directive::has_tags(t)),
            content: None,
        })
    }

    /// Classify every tag as inline or row-level and build the row tree
    fn assign_roles(&mut self) -> Result<()> {
        let mut tagged: Vec<(usize, usize)> = Vec::new();
        let mut texts = Vec::new();
        for (ri, row) in self.rows.iter().enumerate() {
            for (ci, cell) in row.cells.iter().enumerate() {
                if let Some(text) = &cell.text {
                    tagged.push((ri, ci));
                    texts.push((cell.token.span.start, text.as_str()));
                }
            }
        }
        self.directives = directive::scan_texts(&self.part, texts)?;
        if self.directives.is_empty() {
            self.tree = (0..self.rows.len()).map(RowSeg::Row).collect();
            return Ok(());
        }

        // Pair tags across the whole sheet; a pair inside one cell is inline
        let mut roles = vec![Role::Inline; self.directives.len()];
        let mut stack: Vec<(usize, (usize, usize))> = Vec::new();
        let mut opens_before: Vec<Vec<(BlockKind, String)>> = vec![Vec::new(); self.rows.len()];
        let mut closes_after: Vec<Vec<String>> = vec![Vec::new(); self.rows.len()];
        let mut index = 0;

        for &(ri, ci) in &tagged {
            let Some(text) = &self.rows[ri].cells[ci].text else {
                continue;
            };
            for piece in split_tags(text) {
                let Piece::Tag { tag, .. } = piece else {
                    continue;
                };
                if let Some(kind) = BlockKind::of(&tag) {
                    stack.push((index, (ri, ci)));
                    opens_before[ri].push((kind, tag.path));
                } else if tag.kind == DirectiveKind::RepeatEnd {
                    if let Some((open, cell)) = stack.pop() {
                        if cell == (ri, ci) {
                            opens_before[ri].pop();
                        } else {
                            roles[open] = Role::RowOpen;
                            roles[index] = Role::RowClose;
                            closes_after[ri].push(self.directives[open].path.clone());
                        }
                    }
                }
                index += 1;
            }
        }

        // Inline content per tagged cell
        let mut index = 0;
        for &(ri, ci) in &tagged {
            let cell = &mut self.rows[ri].cells[ci];
            let Some(text) = &cell.text else {
                continue;
            };
            let mut items = Vec::new();
            for piece in split_tags(text) {
                match piece {
                    Piece::Text(t) => items.push(Item::Raw(t.to_string())),
                    Piece::Tag { tag, .. } => {
                        let role = roles[index];
                        index += 1;
                        if role != Role::Inline {
                            continue;
                        }
                        items.push(Item::of(tag));
                    }
                }
            }
            cell.content = Some(segment::build(&self.part, items)?);
        }

        self.tree = self.build_tree(opens_before, closes_after)?;
        Ok(())
    }

    fn build_tree(
        &self,
        opens_before: Vec<Vec<(BlockKind, String)>>,
        closes_after: Vec<Vec<String>>,
    ) -> Result<Vec<RowSeg>> {
        struct Open {
            kind: BlockKind,
            path: String,
            first: u32,
            body: Vec<RowSeg>,
        }
        let mut stack: Vec<Open> = Vec::new();
        let mut root = Vec::new();

        for (ri, (opens, closes)) in opens_before.into_iter().zip(closes_after).enumerate() {
            let number = self.rows[ri].number;
            for (kind, path) in opens {
                stack.push(Open {
                    kind,
                    path,
                    first: number,
                    body: Vec::new(),
                });
            }
            match stack.last_mut() {
                Some(open) => open.body.push(RowSeg::Row(ri)),
                None => root.push(RowSeg::Row(ri)),
            }
            for path in closes {
                let Some(open) = stack.pop() else {
                    return Err(malformed(&self.part, format!("block '{path}' closes nothing")));
                };
                if number < open.first {
                    return Err(malformed(
                        &self.part,
                        format!(
                            "block '{}' closes on row {} above its opening row {}",
                            open.path, number, open.first
                        ),
                    ));
                }
                if open.path != path {
                    return Err(malformed(
                        &self.part,
                        format!(
                            "blocks '{}' and '{}' share row {}",
                            open.path, path, number
                        ),
                    ));
                }
                let block = RowSeg::Block {
                    kind: open.kind,
                    path: open.path,
                    first: open.first,
                    last: number,
                    body: open.body,
                };
                match stack.last_mut() {
                    Some(parent) => parent.body.push(block),
                    None => root.push(block),
                }
            }
        }

        if let Some(open) = stack.pop() {
            return Err(malformed(
                &self.part,
                format!("block '{}' is never closed", open.path),
            ));
        }
        Ok(root)
    }

    /// Expand the sheet against the model
    pub fn render(&self, model: &BoundModel) -> Result<RenderedSheet> {
        let Some(data) = self.data.clone() else {
            return Ok(RenderedSheet {
                xml: self.source.clone(),
                map: RowMap::default(),
            });
        };

        let mut walk = Walk::default();
        let mut scope = model.scope();
        self.walk(&self.tree, &mut scope, &mut walk);

        let map = RowMap::new(std::mem::take(&mut walk.blocks));
        let mut out = String::with_capacity(self.source.len());

        self.rewrite_outside(0..data.start, &map, &walk.rows, &mut out)?;
        if data.len() == 1 {
            out.push_str(self.tokens[data.start].raw(&self.source));
        } else {
            out.push_str(self.tokens[data.start].raw(&self.source));
            for row in &walk.rows {
                let mapping = CopyMapping {
                    sheet: &map,
                    frames: &row.frames,
                };
                emit(&row.chunks, &self.name, &mapping, row.repeated, &mut out);
            }
            out.push_str(self.tokens[data.end - 1].raw(&self.source));
        }
        self.rewrite_outside(data.end..self.tokens.len(), &map, &walk.rows, &mut out)?;

        Ok(RenderedSheet { xml: out, map })
    }

    fn walk<'a>(&self, segments: &[RowSeg], scope: &mut Scope<'a>, walk: &mut Walk) {
        for segment in segments {
            match segment {
                RowSeg::Row(ri) => {
                    let row = &self.rows[*ri];
                    let number = clamp_row(i64::from(row.number) + walk.delta);
                    let chunks = self.render_row(row, number, scope);
                    walk.rows.push(OutRow {
                        origin: row.number,
                        number,
                        frames: walk.frames.clone(),
                        repeated: walk.repeats > 0,
                        chunks,
                    });
                }
                RowSeg::Block {
                    kind,
                    path,
                    first,
                    last,
                    body,
                } => {
                    let start = walk.delta;
                    let height = i64::from(*last) - i64::from(*first) + 1;

                    let frames = segment::iterations(*kind, path, scope);
                    let copies = frames.len();

                    for (n, frame) in frames.into_iter().enumerate() {
                        if let Some(value) = frame {
                            scope.push(value);
                        }
                        if n == 1 {
                            walk.repeats += 1;
                        }
                        walk.frames.push(CopyFrame {
                            first: *first,
                            last: *last,
                            shift: walk.delta,
                        });
                        self.walk(body, scope, walk);
                        walk.frames.pop();
                        if frame.is_some() {
                            scope.pop();
                        }
                        walk.delta += height;
                    }
                    if copies > 1 {
                        walk.repeats -= 1;
                    }

                    if walk.frames.is_empty() {
                        walk.blocks.push(ExpandedBlock {
                            first: *first,
                            last: *last,
                            out_first: clamp_row(i64::from(*first) + start),
                            out_rows: u32::try_from(walk.delta - start).unwrap_or(0),
                        });
                    }
                    walk.delta -= height;
                }
            }
        }
    }

    fn render_row<'a>(&self, row: &TemplateRow, number: u32, scope: &mut Scope<'a>) -> Vec<Chunk> {
        let moved = number != row.number;
        let mut chunks = Vec::with_capacity(row.cells.len() + 2);

        if moved && row.token.attribute("r").is_some() {
            let mut token = row.token.clone();
            token.set_attribute("r", number.to_string());
            chunks.push(Chunk::Raw(token.to_tag()));
        } else {
            chunks.push(Chunk::Raw(row.raw_start.clone()));
        }

        for cell in &row.cells {
            self.render_cell(cell, number, moved, scope, &mut chunks);
        }

        if !row.extra.is_empty() {
            chunks.push(Chunk::Raw(row.extra.clone()));
        }
        if let Some(end) = &row.raw_end {
            chunks.push(Chunk::Raw(end.clone()));
        }
        chunks
    }

    fn render_cell<'a>(
        &self,
        cell: &TemplateCell,
        number: u32,
        moved: bool,
        scope: &mut Scope<'a>,
        chunks: &mut Vec<Chunk>,
    ) {
        let mut token = cell.token.clone();
        if let Some(reference) = cell.reference.filter(|_| moved) {
            token.set_attribute("r", reference.with_row(number).to_string());
        }

        let Some(content) = &cell.content else {
            if moved {
                chunks.push(Chunk::Raw(token.to_tag()));
            } else {
                chunks.push(Chunk::Raw(cell.raw_start.clone()));
            }
            chunks.extend(cell.inner.iter().cloned());
            if let Some(end) = &cell.raw_end {
                chunks.push(Chunk::Raw(end.clone()));
            }
            return;
        };

        let prefix = token
            .qname
            .split_once(':')
            .map(|(p, _)| format!("{p}:"))
            .unwrap_or_default();
        let value = match content.as_slice() {
            [Segment::Field(path)] => CellValue::of(scope.resolve(path)),
            _ => {
                let mut text = String::new();
                segment::render(content, scope, &mut text, &mut plain_text);
                if text.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(text)
                }
            }
        };

        token.attributes.retain(|(key, _)| key != "t");
        let body = match value {
            CellValue::Empty => None,
            CellValue::Number(n) => Some(format!("<{prefix}v>{n}</{prefix}v>")),
            CellValue::Bool(b) => {
                token.set_attribute("t", "b");
                Some(format!("<{prefix}v>{}</{prefix}v>", u8::from(b)))
            }
            CellValue::Text(text) => {
                token.set_attribute("t", "inlineStr");
                Some(format!(
                    "<{prefix}is><{prefix}t xml:space=\"preserve\">{}</{prefix}t></{prefix}is>",
                    escape_text(&text)
                ))
            }
        };

        match body {
            Some(body) => {
                token.kind = TokenKind::Start;
                chunks.push(Chunk::Raw(format!("{}{}</{}>", token.to_tag(), body, token.qname)));
            }
            None => {
                token.kind = TokenKind::Empty;
                chunks.push(Chunk::Raw(token.to_tag()));
            }
        }
    }

    /// Rewrite markup outside `sheetData` that names rows
    fn rewrite_outside(
        &self,
        range: Range<usize>,
        map: &RowMap,
        rows: &[OutRow],
        out: &mut String,
    ) -> Result<()> {
        let identity = map.is_identity();
        let mut k = range.start;

        while k < range.end {
            let token = &self.tokens[k];
            let raw = token.raw(&self.source);

            if identity {
                out.push_str(raw);
                k += 1;
                continue;
            }

            if token.is_start("mergeCells") {
                let end = self.element_end(k)?;
                self.rewrite_merges(k, end, map, rows, out);
                k = end + 1;
                continue;
            }

            if matches!(token.kind, TokenKind::Start | TokenKind::Empty) {
                let attribute = RANGE_ATTRIBUTES
                    .iter()
                    .find(|(local, _)| token.local_name() == *local)
                    .map(|(_, attribute)| *attribute);
                if let Some(value) = attribute.and_then(|a| token.attribute(a).map(|v| (a, v))) {
                    let (attribute, value) = value;
                    let mapped = map.map_sqref(value);
                    if mapped != value {
                        let mut tag = token.clone();
                        tag.set_attribute(attribute, mapped);
                        out.push_str(&tag.to_tag());
                        k += 1;
                        continue;
                    }
                }
            }

            let in_formula = token.kind == TokenKind::Text
                && self.parents[k].is_some_and(|p| {
                    self.tokens[p].kind == TokenKind::Start
                        && FORMULA_ELEMENTS.contains(&self.tokens[p].local_name())
                });
            if in_formula {
                let formula = unescape_text(raw)?;
                let shifted = shift_formula(&formula, &self.name, true, map);
                if shifted != formula {
                    out.push_str(&escape_text(&shifted));
                    k += 1;
                    continue;
                }
            }

            out.push_str(raw);
            k += 1;
        }
        Ok(())
    }

    /// Merges inside expanded blocks are repeated for every copy of their row
    fn rewrite_merges(&self, start: usize, end: usize, map: &RowMap, rows: &[OutRow], out: &mut String) {
        let mut refs: Vec<String> = Vec::new();
        let mut merge_qname = None;

        for token in &self.tokens[start + 1..end] {
            if !token.opens("mergeCell") {
                continue;
            }
            merge_qname.get_or_insert_with(|| token.qname.clone());
            let Some(value) = token.attribute("ref") else {
                continue;
            };
            let Ok(range) = value.parse::<CellRange>() else {
                refs.push(value.to_string());
                continue;
            };

            if map.in_block(range.start.row) {
                for row in rows.iter().filter(|r| r.origin == range.start.row) {
                    let offset = i64::from(row.number) - i64::from(row.origin);
                    let moved = CellRange {
                        start: range.start.with_row(row.number),
                        end: range
                            .end
                            .with_row(clamp_row(i64::from(range.end.row) + offset)),
                        is_span: range.is_span,
                    };
                    refs.push(moved.to_string());
                }
            } else {
                refs.push(map.map_range(range).to_string());
            }
        }

        if refs.is_empty() {
            return;
        }

        let mut tag = self.tokens[start].clone();
        tag.set_attribute("count", refs.len().to_string());
        out.push_str(&tag.to_tag());
        let merge_qname = merge_qname.unwrap_or_else(|| "mergeCell".to_string());
        for r in refs {
            out.push_str(&ooxml_core::xml::start_tag(
                &merge_qname,
                &[("ref".to_string(), r)],
                true,
            ));
        }
        out.push_str(self.tokens[end].raw(&self.source));
    }
}

/// Value written into a single-field cell
enum CellValue {
    Empty,
    Number(String),
    Bool(bool),
    Text(String),
}

impl CellValue {
    fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => CellValue::Empty,
            Some(Value::Number(n)) => CellValue::Number(n.to_string()),
            Some(Value::Bool(b)) => CellValue::Bool(*b),
            Some(Value::String(s)) if s.is_empty() => CellValue::Empty,
            Some(other) => CellValue::Text(field_text(other).into_owned()),
        }
    }
}

/// Cell text for a field; images have no cell form and render blank
fn plain_text(kind: FieldKind, value: Option<&Value>, out: &mut String) {
    match (kind, value) {
        (FieldKind::Text, Some(value)) => out.push_str(&field_text(value)),
        (FieldKind::Image, Some(_)) => tracing::debug!("image tag in a worksheet renders blank"),
        (_, None) => {}
    }
}

/// Write chunks, shifting formulas through the mapping
///
/// A shared formula master repeated by a block keeps its role only in the
/// first copy; later copies carry a plain formula so every `si` has one master.
fn emit(chunks: &[Chunk], sheet: &str, mapping: &dyn RowMapping, repeated: bool, out: &mut String) {
    for chunk in chunks {
        match chunk {
            Chunk::Raw(raw) => out.push_str(raw),
            Chunk::FormulaTag { token, .. }
                if repeated
                    && token.attribute("t") == Some("shared")
                    && token.attribute("ref").is_some() =>
            {
                let mut tag = token.clone();
                tag.attributes
                    .retain(|(key, _)| !matches!(key.as_str(), "t" | "ref" | "si"));
                out.push_str(&tag.to_tag());
            }
            Chunk::FormulaTag { raw, token } => match token.attribute("ref") {
                Some(value) => {
                    let mapped = mapping.map_sqref(value);
                    if mapped == value {
                        out.push_str(raw);
                    } else {
                        let mut tag = token.clone();
                        tag.set_attribute("ref", mapped);
                        out.push_str(&tag.to_tag());
                    }
                }
                None => out.push_str(raw),
            },
            Chunk::Formula { raw, text } => {
                let shifted = shift_formula(text, sheet, true, mapping);
                if &shifted == text {
                    out.push_str(raw);
                } else {
                    out.push_str(&escape_text(&shifted));
                }
            }
        }
    }
}
