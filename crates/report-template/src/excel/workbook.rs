//! Workbook-level parts: sheet list, shared strings, defined names, calc settings

use super::rows::{shift_formula, RowMap};
use crate::directive::malformed;
use crate::Result;
use ooxml_core::xml::{parent_indices, tokenize, unescape_text, TokenKind, XmlToken};
use ooxml_core::{resolve_target, Package};

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_REL: &str = "/sharedStrings";
const CALC_CHAIN_REL: &str = "/calcChain";

/// `calcPr` must precede these workbook children
const AFTER_CALC_PR: &[&str] = &[
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// A worksheet listed in the workbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// 1-based position in the workbook
    pub index: u32,
    pub name: String,
    /// Worksheet part name
    pub part: String,
}

/// Sheet list and related parts of a workbook
#[derive(Debug, Clone)]
pub struct Workbook {
    pub part: String,
    pub sheets: Vec<SheetInfo>,
    pub shared_strings: Option<String>,
    pub calc_chain: Option<String>,
}

impl Workbook {
    /// Read the workbook part and its relationships
    pub fn read(package: &Package) -> Result<Self> {
        let part = package
            .relationships("")?
            .entries
            .iter()
            .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_REL))
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

        let xml = package.xml_part(&part)?;
        let rels = package.relationships(&part)?;

        let mut sheets = Vec::new();
        for token in tokenize(&xml)? {
            if !token.opens("sheet") {
                continue;
            }
            let name = token.attribute("name").unwrap_or_default().to_string();
            let Some(id) = relationship_id(&token) else {
                return Err(malformed(&part, format!("sheet '{name}' has no relationship id")));
            };
            let Some(rel) = rels.get(id) else {
                return Err(malformed(&part, format!("sheet '{name}' points at unknown relationship {id}")));
            };
            sheets.push(SheetInfo {
                index: sheets.len() as u32 + 1,
                name,
                part: resolve_target(&part, &rel.target),
            });
        }

        let find = |suffix: &str| {
            rels.entries
                .iter()
                .find(|rel| !rel.is_external() && rel.rel_type.ends_with(suffix))
                .map(|rel| resolve_target(&part, &rel.target))
        };
        let shared_strings = find(SHARED_STRINGS_REL);
        let calc_chain = find(CALC_CHAIN_REL);

        Ok(Self {
            part,
            sheets,
            shared_strings,
            calc_chain,
        })
    }

    /// Sheet by 1-based position
    pub fn sheet(&self, index: u32) -> Option<&SheetInfo> {
        self.sheets.iter().find(|s| s.index == index)
    }
}

fn relationship_id(token: &XmlToken) -> Option<&str> {
    token
        .attributes
        .iter()
        .find(|(key, _)| key.ends_with(":id"))
        .map(|(_, value)| value.as_str())
}

/// Plain text of every shared string item, in index order
///
/// Phonetic runs (`rPh`) are not part of the visible text and are skipped.
pub fn read_shared_strings(xml: &str) -> Result<Vec<String>> {
    let tokens = tokenize(xml)?;
    let parents = parent_indices(&tokens);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Start if token.local_name() == "si" => current = Some(String::new()),
            TokenKind::Empty if token.local_name() == "si" => strings.push(String::new()),
            TokenKind::End if token.local_name() == "si" => {
                strings.push(current.take().unwrap_or_default());
            }
            TokenKind::Text => {
                let Some(text) = current.as_mut() else {
                    continue;
                };
                let in_t = parents[i].is_some_and(|p| tokens[p].is_start("t"));
                if in_t && !inside(&tokens, &parents, i, "rPh") {
                    text.push_str(&unescape_text(token.raw(xml))?);
                }
            }
            _ => {}
        }
    }

    Ok(strings)
}

/// True if any enclosing element of token `i` has the given local name
pub(crate) fn inside(tokens: &[XmlToken], parents: &[Option<usize>], mut i: usize, local: &str) -> bool {
    while let Some(parent) = parents[i] {
        if tokens[parent].is_start(local) {
            return true;
        }
        i = parent;
    }
    false
}

/// Rewrite the workbook part after rendering
///
/// Defined names that point into expanded sheets are shifted; when
/// `full_calc` is set, Excel is told to recalculate on open. Returns `None`
/// if nothing changed.
pub fn rewrite_workbook(
    xml: &str,
    shifts: &[(&str, &RowMap)],
    full_calc: bool,
) -> Result<Option<String>> {
    let tokens = tokenize(xml)?;
    let parents = parent_indices(&tokens);
    let mut out = String::with_capacity(xml.len() + 64);
    let mut changed = false;
    let mut has_calc_pr = false;
    let root_index = root(&tokens);

    for (i, token) in tokens.iter().enumerate() {
        let raw = token.raw(xml);

        if full_calc && token.opens("calcPr") {
            has_calc_pr = true;
            if token.attribute("fullCalcOnLoad") != Some("1") {
                let mut tag = token.clone();
                tag.set_attribute("fullCalcOnLoad", "1");
                out.push_str(&tag.to_tag());
                changed = true;
                continue;
            }
        }

        let closes_root = token.kind == TokenKind::End && parents[i].is_none();
        let follows_calc_pr = parents[i].is_some()
            && parents[i] == root_index
            && matches!(token.kind, TokenKind::Start | TokenKind::Empty)
            && AFTER_CALC_PR.contains(&token.local_name());
        if full_calc && !has_calc_pr && (closes_root || follows_calc_pr) {
            out.push_str(&calc_pr_tag(&tokens));
            has_calc_pr = true;
            changed = true;
        }

        let in_defined_name = token.kind == TokenKind::Text
            && parents[i].is_some_and(|p| tokens[p].is_start("definedName"));
        if in_defined_name && !shifts.is_empty() {
            let formula = unescape_text(raw)?;
            let mut shifted = formula.to_string();
            for (sheet, map) in shifts {
                shifted = shift_formula(&shifted, sheet, false, *map);
            }
            if shifted != formula {
                out.push_str(&ooxml_core::xml::escape_text(&shifted));
                changed = true;
                continue;
            }
        }

        out.push_str(raw);
    }

    Ok(changed.then_some(out))
}

/// Index of the document element
fn root(tokens: &[XmlToken]) -> Option<usize> {
    tokens
        .iter()
        .position(|t| matches!(t.kind, TokenKind::Start | TokenKind::Empty))
}

fn calc_pr_tag(tokens: &[XmlToken]) -> String {
    let prefix = root(tokens)
        .and_then(|i| tokens[i].qname.split_once(':'))
        .map(|(prefix, _)| format!("{prefix}:"))
        .unwrap_or_default();
    format!("<{prefix}calcPr fullCalcOnLoad=\"1\"/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::rows::ExpandedBlock;
    use pretty_assertions::assert_eq;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Summary" sheetId="2" r:id="rId2"/></sheets><definedNames><definedName name="Totals">Data!$B$2:$B$2</definedName><definedName name="Other">Summary!$A$1</definedName></definedNames><calcPr calcId="191029"/></workbook>"#;

    fn grown() -> RowMap {
        RowMap::new(vec![ExpandedBlock {
            first: 2,
            last: 2,
            out_first: 2,
            out_rows: 4,
        }])
    }

    #[test]
    fn test_shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst count="3"><si><t>Plain</t></si><si><r><t>Rich </t></r><r><t>{{name}}</t></r><rPh><t>ignored</t></rPh></si><si/></sst>"#;
        let strings = read_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Plain", "Rich {{name}}", ""]);
    }

    #[test]
    fn test_defined_names_and_calc() {
        let map = grown();
        let rewritten = rewrite_workbook(WORKBOOK, &[("Data", &map)], true)
            .unwrap()
            .unwrap();
        assert!(rewritten.contains(">Data!$B$2:$B$5<"));
        assert!(rewritten.contains(">Summary!$A$1<"));
        assert!(rewritten.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));
    }

    #[test]
    fn test_calc_pr_inserted_when_missing() {
        let xml = r#"<workbook><sheets/><extLst/></workbook>"#;
        let rewritten = rewrite_workbook(xml, &[], true).unwrap().unwrap();
        assert_eq!(
            rewritten,
            r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/><extLst/></workbook>"#
        );
    }

    #[test]
    fn test_unchanged_workbook() {
        assert_eq!(rewrite_workbook(WORKBOOK, &[], false).unwrap(), None);
    }
}
