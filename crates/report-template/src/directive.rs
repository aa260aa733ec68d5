//! Directive scanning
//!
//! Templates embed mustache-style tags in their text:
//!
//! | Tag | Meaning |
//! |---|---|
//! | `{{path}}` | substitute a value |
//! | `{{#path}}` | repeat the enclosed range for each element of a sequence |
//! | `{{?path}}` | keep the enclosed range only when the value is truthy |
//! | `{{^path}}` | keep the enclosed range only when the value is falsy |
//! | `{{/path}}` | close the innermost open block |
//!
//! Chart parts carry their own directives: every `<c:f>` range formula is a
//! chart-range directive that is re-resolved after rows have been expanded.

use crate::{ReportError, Result};
use ooxml_core::xml::{tokenize, unescape_text, TokenKind};

/// Directive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Field,
    /// `{{%path}}`: an image taken from the model
    Image,
    RepeatStart,
    RepeatEnd,
    Conditional,
    ChartRange,
}

/// Where a directive was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Package part name
    pub part: String,
    /// Byte offset in the part
    pub offset: usize,
}

/// A placeholder found in template markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Model path (or range formula for chart ranges)
    pub path: String,
    /// Inverted conditional (`{{^path}}`)
    pub inverted: bool,
    pub location: Location,
}

impl Directive {
    /// True for tags that open a block
    pub fn opens_block(&self) -> bool {
        matches!(
            self.kind,
            DirectiveKind::RepeatStart | DirectiveKind::Conditional
        )
    }
}

/// A parsed tag inside a text run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: DirectiveKind,
    pub path: String,
    pub inverted: bool,
}

/// A piece of text: either literal text or a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Tag {
        tag: Tag,
        /// Byte range of the whole `{{...}}` in the source text
        start: usize,
        end: usize,
    },
}

/// Quick check before running the lexer
pub fn has_tags(text: &str) -> bool {
    text.contains("{{")
}

/// Split text into literal pieces and tags
pub fn split_tags(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    let mut search = 0;

    while let Some(open) = text[search..].find("{{").map(|p| p + search) {
        let Some(close) = text[open + 2..].find("}}").map(|p| p + open + 2) else {
            break;
        };
        let Some(tag) = parse_tag(&text[open + 2..close]) else {
            search = open + 2;
            continue;
        };

        if open > cursor {
            pieces.push(Piece::Text(&text[cursor..open]));
        }
        pieces.push(Piece::Tag {
            tag,
            start: open,
            end: close + 2,
        });
        cursor = close + 2;
        search = cursor;
    }

    if cursor < text.len() {
        pieces.push(Piece::Text(&text[cursor..]));
    }
    pieces
}

fn parse_tag(inner: &str) -> Option<Tag> {
    let inner = inner.trim();
    let (kind, inverted, path) = match inner.chars().next()? {
        '#' => (DirectiveKind::RepeatStart, false, &inner[1..]),
        '?' => (DirectiveKind::Conditional, false, &inner[1..]),
        '^' => (DirectiveKind::Conditional, true, &inner[1..]),
        '/' => (DirectiveKind::RepeatEnd, false, &inner[1..]),
        '%' => (DirectiveKind::Image, false, &inner[1..]),
        _ => (DirectiveKind::Field, false, inner),
    };
    let path = path.trim();
    if path.is_empty() && kind != DirectiveKind::RepeatEnd {
        return None;
    }
    if path.contains('{') || path.contains('}') {
        return None;
    }
    Some(Tag {
        kind,
        path: path.to_string(),
        inverted,
    })
}

/// Scan text runs of a part into directives
///
/// `texts` yields `(offset, text)` pairs in document order.
pub fn scan_texts<'a>(
    part: &str,
    texts: impl IntoIterator<Item = (usize, &'a str)>,
) -> Result<Vec<Directive>> {
    let mut directives = Vec::new();
    for (offset, text) in texts {
        if !has_tags(text) {
            continue;
        }
        for piece in split_tags(text) {
            if let Piece::Tag { tag, start, .. } = piece {
                directives.push(Directive {
                    kind: tag.kind,
                    path: tag.path,
                    inverted: tag.inverted,
                    location: Location {
                        part: part.to_string(),
                        offset: offset + start,
                    },
                });
            }
        }
    }
    check_nesting(part, &directives)?;
    Ok(directives)
}

/// Check that every block tag is closed by the innermost matching close tag
///
/// Returns the `(open, close)` index pairs in order of their close tags.
pub fn check_nesting(part: &str, directives: &[Directive]) -> Result<Vec<(usize, usize)>> {
    let mut stack: Vec<usize> = Vec::new();
    let mut pairs = Vec::new();

    for (i, directive) in directives.iter().enumerate() {
        if directive.opens_block() {
            stack.push(i);
        } else if directive.kind == DirectiveKind::RepeatEnd {
            let Some(open) = stack.pop() else {
                return Err(malformed(
                    part,
                    format!(
                        "closing tag {{{{/{}}}}} at offset {} has no open block",
                        directive.path, directive.location.offset
                    ),
                ));
            };
            let opened = &directives[open];
            if !directive.path.is_empty() && directive.path != opened.path {
                return Err(malformed(
                    part,
                    format!(
                        "closing tag {{{{/{}}}}} at offset {} does not match open block '{}'",
                        directive.path, directive.location.offset, opened.path
                    ),
                ));
            }
            pairs.push((open, i));
        }
    }

    if let Some(&open) = stack.last() {
        let directive = &directives[open];
        return Err(malformed(
            part,
            format!(
                "block '{}' opened at offset {} is never closed",
                directive.path, directive.location.offset
            ),
        ));
    }

    Ok(pairs)
}

/// Scan a chart part for data range formulas
pub fn scan_chart_ranges(part: &str, xml: &str) -> Result<Vec<Directive>> {
    let tokens = tokenize(xml)?;
    let mut directives = Vec::new();

    for window in tokens.windows(2) {
        let (open, text) = (&window[0], &window[1]);
        if open.is_start("f") && text.kind == TokenKind::Text {
            directives.push(Directive {
                kind: DirectiveKind::ChartRange,
                path: unescape_text(text.raw(xml))?.into_owned(),
                inverted: false,
                location: Location {
                    part: part.to_string(),
                    offset: text.span.start,
                },
            });
        }
    }

    Ok(directives)
}

pub(crate) fn malformed(part: &str, reason: impl Into<String>) -> ReportError {
    ReportError::MalformedTemplate {
        part: part.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(directives: &[Directive]) -> Vec<DirectiveKind> {
        directives.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_split_tags() {
        let pieces = split_tags("Dear {{ customer.name }}, total {{total}}!");
        assert_eq!(pieces.len(), 5);
        assert_eq!(pieces[0], Piece::Text("Dear "));
        match &pieces[1] {
            Piece::Tag { tag, start, end } => {
                assert_eq!(tag.kind, DirectiveKind::Field);
                assert_eq!(tag.path, "customer.name");
                assert_eq!((*start, *end), (5, 24));
            }
            other => panic!("expected tag, got {other:?}"),
        }
        assert_eq!(pieces[4], Piece::Text("!"));
    }

    #[test]
    fn test_split_tags_ignores_unterminated_and_empty() {
        assert_eq!(split_tags("a {{ b"), vec![Piece::Text("a {{ b")]);
        assert_eq!(split_tags("{{}} x"), vec![Piece::Text("{{}} x")]);
    }

    #[test]
    fn test_block_sigils() {
        let directives =
            scan_texts("p", [(0, "{{#items}}{{?flag}}{{^other}}{{/other}}{{/}}{{/items}}")])
                .unwrap();
        assert_eq!(
            kinds(&directives),
            vec![
                DirectiveKind::RepeatStart,
                DirectiveKind::Conditional,
                DirectiveKind::Conditional,
                DirectiveKind::RepeatEnd,
                DirectiveKind::RepeatEnd,
                DirectiveKind::RepeatEnd,
            ]
        );
        assert!(!directives[1].inverted);
        assert!(directives[2].inverted);
    }

    #[test]
    fn test_image_sigil() {
        let directives = scan_texts("p", [(0, "Logo: {{% company.logo }} {{%}}")]).unwrap();
        assert_eq!(kinds(&directives), vec![DirectiveKind::Image]);
        assert_eq!(directives[0].path, "company.logo");
        assert!(!directives[0].opens_block());
    }

    #[test]
    fn test_offsets_span_texts() {
        let directives = scan_texts("word/document.xml", [(100, "x {{a}}"), (200, "{{b}}")])
            .unwrap();
        assert_eq!(directives[0].location.offset, 102);
        assert_eq!(directives[1].location.offset, 200);
        assert_eq!(directives[1].location.part, "word/document.xml");
    }

    #[test]
    fn test_close_without_open() {
        let err = scan_texts("sheet1", [(0, "{{name}}{{/items}}")]).unwrap_err();
        assert!(matches!(err, ReportError::MalformedTemplate { .. }));
        assert!(err.to_string().contains("has no open block"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = scan_texts("sheet1", [(0, "{{#items}}{{name}}")]).unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn test_mismatched_close() {
        let err = scan_texts("sheet1", [(0, "{{#a}}{{#b}}{{/a}}{{/b}}")]).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_chart_ranges() {
        let xml = r#"<c:chartSpace><c:ser><c:val><c:numRef><c:f>Sheet1!$B$2:$B$4</c:f></c:numRef></c:val></c:ser></c:chartSpace>"#;
        let directives = scan_chart_ranges("xl/charts/chart1.xml", xml).unwrap();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].kind, DirectiveKind::ChartRange);
        assert_eq!(directives[0].path, "Sheet1!$B$2:$B$4");
    }
}
