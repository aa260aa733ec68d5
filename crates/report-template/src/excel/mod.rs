//! Excel workbook rendering
//!
//! Each selected worksheet is rendered on its own against the same model.
//! Expanding rows moves cells, so afterwards the workbook's defined names,
//! chart series and tables that point into an expanded sheet are shifted,
//! the calculation chain is dropped and Excel is asked to recalculate.

pub mod chart;
pub mod rows;
pub mod sheet;
pub mod workbook;

use crate::{BoundModel, ReportError, ReportOptions, Result};
use ooxml_core::xml::{parent_indices, tokenize, TokenKind};
use ooxml_core::{resolve_target, Package};
use rows::{RowMap, RowMapping};
use sheet::SheetTemplate;
use workbook::{read_shared_strings, rewrite_workbook, Workbook};

const TABLE_REL: &str = "/table";
const DRAWING_REL: &str = "/drawing";

/// Which worksheets to render
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelection {
    /// The first sheet
    #[default]
    First,
    /// One sheet by 1-based number
    Single(u32),
    /// Several sheets by 1-based number
    Many(Vec<u32>),
}

impl SheetSelection {
    /// Selection from request fields; a sheet list wins over a single number
    pub fn from_request(sheet_number: Option<u32>, sheet_numbers: Option<&[u32]>) -> Self {
        match (sheet_numbers, sheet_number) {
            (Some(numbers), _) if !numbers.is_empty() => SheetSelection::Many(numbers.to_vec()),
            (_, Some(number)) => SheetSelection::Single(number),
            _ => SheetSelection::First,
        }
    }

    /// Sorted, de-duplicated sheet numbers, each checked against the workbook
    pub fn resolve(&self, available: usize) -> Result<Vec<u32>> {
        let mut numbers = match self {
            SheetSelection::First => vec![1],
            SheetSelection::Single(n) => vec![*n],
            SheetSelection::Many(ns) => ns.clone(),
        };
        numbers.sort_unstable();
        numbers.dedup();

        if let Some(&bad) = numbers
            .iter()
            .find(|&&n| n == 0 || n as usize > available)
        {
            return Err(ReportError::InvalidSheet {
                sheet: bad,
                available,
            });
        }
        Ok(numbers)
    }
}

/// Renders selected worksheets of an Excel package
pub struct ExcelRenderer<'o> {
    options: &'o ReportOptions,
}

impl<'o> ExcelRenderer<'o> {
    /// Create a renderer
    pub fn new(options: &'o ReportOptions) -> Self {
        Self { options }
    }

    /// Render in place; returns the number of directives expanded
    pub fn render(
        &self,
        package: &mut Package,
        model: &BoundModel,
        selection: &SheetSelection,
    ) -> Result<usize> {
        let workbook = Workbook::read(package)?;
        let selected = selection.resolve(workbook.sheets.len())?;

        let shared_strings = match &workbook.shared_strings {
            Some(part) if package.contains(part) => read_shared_strings(&package.xml_part(part)?)?,
            _ => Vec::new(),
        };

        let mut total = 0;
        let mut shifts: Vec<(String, String, RowMap)> = Vec::new();

        for number in selected {
            let Some(info) = workbook.sheet(number) else {
                continue;
            };
            let xml = package.xml_part(&info.part)?;
            let template = SheetTemplate::scan(&info.part, &info.name, &xml, &shared_strings)?;
            if template.directives().is_empty() {
                tracing::debug!(sheet = %info.name, "sheet has no directives");
                continue;
            }
            total += template.directives().len();

            let rendered = template.render(model)?;
            package.set_part(&info.part, rendered.xml.into_bytes());
            tracing::debug!(
                sheet = %info.name,
                directives = template.directives().len(),
                "rendered sheet"
            );

            if !rendered.map.is_identity() {
                shifts.push((info.name.clone(), info.part.clone(), rendered.map));
            }
        }

        if total == 0 {
            return Ok(0);
        }

        let by_name: Vec<(&str, &RowMap)> = shifts
            .iter()
            .map(|(name, _, map)| (name.as_str(), map))
            .collect();

        let workbook_xml = package.xml_part(&workbook.part)?;
        if let Some(xml) = rewrite_workbook(&workbook_xml, &by_name, self.options.recalculate_on_load)? {
            package.set_part(&workbook.part, xml.into_bytes());
        }

        if !by_name.is_empty() {
            for part in chart::chart_parts(package) {
                let xml = package.xml_part(&part)?;
                if let Some(xml) = chart::shift_chart(&part, &xml, &by_name)? {
                    package.set_part(&part, xml.into_bytes());
                }
            }
            for (_, sheet_part, map) in &shifts {
                shift_tables(package, sheet_part, map)?;
                shift_drawings(package, sheet_part, map)?;
            }
        }

        let calc_chain = workbook
            .calc_chain
            .clone()
            .unwrap_or_else(|| "xl/calcChain.xml".to_string());
        if package.remove_part_and_references(&calc_chain)? {
            tracing::debug!(part = %calc_chain, "removed calculation chain");
        }

        Ok(total)
    }
}

/// Internal parts a sheet links to with a relationship type ending in `suffix`
fn related_parts(package: &Package, sheet_part: &str, suffix: &str) -> Result<Vec<String>> {
    Ok(package
        .relationships(sheet_part)?
        .entries
        .iter()
        .filter(|rel| !rel.is_external() && rel.rel_type.ends_with(suffix))
        .map(|rel| resolve_target(sheet_part, &rel.target))
        .filter(|part| package.contains(part))
        .collect())
}

/// Extend the ranges of tables that live on an expanded sheet
fn shift_tables(package: &mut Package, sheet_part: &str, map: &RowMap) -> Result<()> {
    for part in related_parts(package, sheet_part, TABLE_REL)? {
        let xml = package.xml_part(&part)?;
        let mut out = String::with_capacity(xml.len());
        let mut changed = false;

        for token in tokenize(&xml)? {
            let value = (token.opens("table") || token.opens("autoFilter"))
                .then(|| token.attribute("ref"))
                .flatten();
            match value.map(|v| (v, map.map_sqref(v))) {
                Some((before, after)) if before != after => {
                    let mut tag = token.clone();
                    tag.set_attribute("ref", after);
                    out.push_str(&tag.to_tag());
                    changed = true;
                }
                _ => out.push_str(token.raw(&xml)),
            }
        }

        if changed {
            package.set_part(&part, out.into_bytes());
        }
    }
    Ok(())
}

/// Move drawing anchors (charts, pictures, shapes) of an expanded sheet
///
/// Anchor rows inside `<xdr:from>` / `<xdr:to>` are 0-based.
fn shift_drawings(package: &mut Package, sheet_part: &str, map: &RowMap) -> Result<()> {
    for part in related_parts(package, sheet_part, DRAWING_REL)? {
        let xml = package.xml_part(&part)?;
        let tokens = tokenize(&xml)?;
        let parents = parent_indices(&tokens);
        let mut out = String::with_capacity(xml.len());
        let mut moved = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            let raw = token.raw(&xml);
            let anchor_row = token.kind == TokenKind::Text
                && parents[i].is_some_and(|p| {
                    tokens[p].is_start("row")
                        && parents[p].is_some_and(|g| tokens[g].is_start("from") || tokens[g].is_start("to"))
                });
            match raw.trim().parse::<u32>() {
                Ok(row) if anchor_row => {
                    let shifted = map.row(row.saturating_add(1)).saturating_sub(1);
                    if shifted != row {
                        moved += 1;
                    }
                    out.push_str(&shifted.to_string());
                }
                _ => out.push_str(raw),
            }
        }

        if moved > 0 {
            tracing::debug!(part = %part, anchors = moved, "shifted drawing anchors");
            package.set_part(&part, out.into_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ooxml_core::Relationship;
    use pretty_assertions::assert_eq;
    use rows::ExpandedBlock;

    const SHEET: &str = "xl/worksheets/sheet1.xml";

    /// Row 2 of the template repeated three times
    fn grown_by_two() -> RowMap {
        RowMap::new(vec![ExpandedBlock {
            first: 2,
            last: 2,
            out_first: 2,
            out_rows: 3,
        }])
    }

    /// A package holding one sheet that links to `parts`
    fn sheet_with(parts: &[(&str, &str, &str)]) -> Package {
        let mut package = Package::default();
        package.set_part(SHEET, b"<worksheet/>".to_vec());
        let mut rels = ooxml_core::Relationships::default();
        for (n, (kind, target, xml)) in parts.iter().enumerate() {
            rels.entries.push(Relationship {
                id: format!("rId{}", n + 1),
                rel_type: format!("http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}"),
                target: format!("../{target}"),
                target_mode: None,
            });
            package.set_part(&format!("xl/{target}"), xml.as_bytes().to_vec());
        }
        package.set_part(&ooxml_core::rels_part_for(SHEET), rels.to_xml().into_bytes());
        package
    }

    #[test]
    fn test_tables_grow_with_rows() {
        let table = r#"<table id="1" name="Items" ref="A1:B2"><autoFilter ref="A1:B2"/><tableColumns count="2"/></table>"#;
        let mut package = sheet_with(&[("table", "tables/table1.xml", table)]);
        shift_tables(&mut package, SHEET, &grown_by_two()).unwrap();
        assert_eq!(
            package.xml_part("xl/tables/table1.xml").unwrap(),
            r#"<table id="1" name="Items" ref="A1:B4"><autoFilter ref="A1:B4"/><tableColumns count="2"/></table>"#
        );
    }

    #[test]
    fn test_drawing_anchors_below_block_move() {
        let drawing = "<xdr:wsDr><xdr:twoCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:row>4</xdr:row></xdr:from><xdr:to><xdr:col>5</xdr:col><xdr:row>10</xdr:row></xdr:to></xdr:twoCellAnchor><xdr:oneCellAnchor><xdr:from><xdr:col>3</xdr:col><xdr:row>0</xdr:row></xdr:from></xdr:oneCellAnchor></xdr:wsDr>";
        let mut package = sheet_with(&[("drawing", "drawings/drawing1.xml", drawing)]);
        shift_drawings(&mut package, SHEET, &grown_by_two()).unwrap();
        assert_eq!(
            package.xml_part("xl/drawings/drawing1.xml").unwrap(),
            "<xdr:wsDr><xdr:twoCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:row>6</xdr:row></xdr:from><xdr:to><xdr:col>5</xdr:col><xdr:row>12</xdr:row></xdr:to></xdr:twoCellAnchor><xdr:oneCellAnchor><xdr:from><xdr:col>3</xdr:col><xdr:row>0</xdr:row></xdr:from></xdr:oneCellAnchor></xdr:wsDr>"
        );
    }

    #[test]
    fn test_sheet_without_drawings() {
        let mut package = sheet_with(&[]);
        shift_drawings(&mut package, SHEET, &grown_by_two()).unwrap();
        shift_tables(&mut package, SHEET, &grown_by_two()).unwrap();
        assert_eq!(package.part_names().count(), 2);
    }

    #[test]
    fn test_selection_defaults_to_first_sheet() {
        assert_eq!(SheetSelection::from_request(None, None).resolve(3).unwrap(), vec![1]);
        assert_eq!(
            SheetSelection::from_request(Some(2), Some(&[])).resolve(3).unwrap(),
            vec![2]
        );
    }

    #[test]
    fn test_selection_list_is_sorted_and_deduplicated() {
        let selection = SheetSelection::from_request(Some(1), Some(&[3, 1, 3]));
        assert_eq!(selection, SheetSelection::Many(vec![3, 1, 3]));
        assert_eq!(selection.resolve(3).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_selection_out_of_range() {
        let err = SheetSelection::Single(4).resolve(2).unwrap_err();
        assert!(matches!(err, ReportError::InvalidSheet { sheet: 4, available: 2 }));
        assert!(SheetSelection::Many(vec![0]).resolve(2).is_err());
    }
}
