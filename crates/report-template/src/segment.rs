//! Block tree shared by the Word and Excel renderers
//!
//! Renderers flatten their markup into a stream of [`Item`]s (raw output,
//! fields, block open/close markers placed at the chosen expansion
//! boundaries). The stream is folded into a tree of [`Segment`]s and then
//! rendered against a [`Scope`].

use crate::directive::{malformed, DirectiveKind, Tag};
use crate::model::{section_shown, Scope};
use crate::Result;
use serde_json::Value;

/// How a block decides its iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Once per element of a sequence
    Repeat,
    /// Once when truthy
    Conditional,
    /// Once when falsy
    Inverted,
}

impl BlockKind {
    /// Block kind for an opening tag
    pub fn of(tag: &Tag) -> Option<Self> {
        match (tag.kind, tag.inverted) {
            (DirectiveKind::RepeatStart, _) => Some(BlockKind::Repeat),
            (DirectiveKind::Conditional, false) => Some(BlockKind::Conditional),
            (DirectiveKind::Conditional, true) => Some(BlockKind::Inverted),
            _ => None,
        }
    }
}

/// How a resolved value is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Image,
}

/// Flat stream element
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Raw(String),
    Field(String),
    Image(String),
    Open { kind: BlockKind, path: String },
    Close { path: String },
}

impl Item {
    /// Item for a tag rendered where it stands
    pub fn of(tag: Tag) -> Self {
        match BlockKind::of(&tag) {
            Some(kind) => Item::Open {
                kind,
                path: tag.path,
            },
            None => match tag.kind {
                DirectiveKind::RepeatEnd => Item::Close { path: tag.path },
                DirectiveKind::Image => Item::Image(tag.path),
                _ => Item::Field(tag.path),
            },
        }
    }
}

/// Rendered tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Raw(String),
    Field(String),
    Image(String),
    Block {
        kind: BlockKind,
        path: String,
        body: Vec<Segment>,
    },
}

/// Fold a flat item stream into a segment tree
pub fn build(part: &str, items: Vec<Item>) -> Result<Vec<Segment>> {
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut root: Vec<Segment> = Vec::new();

    for item in items {
        match item {
            Item::Raw(text) => {
                let target = current(&mut stack, &mut root);
                match target.last_mut() {
                    Some(Segment::Raw(prev)) => prev.push_str(&text),
                    _ => target.push(Segment::Raw(text)),
                }
            }
            Item::Field(path) => current(&mut stack, &mut root).push(Segment::Field(path)),
            Item::Image(path) => current(&mut stack, &mut root).push(Segment::Image(path)),
            Item::Open { kind, path } => stack.push((kind, path, Vec::new())),
            Item::Close { path } => {
                let Some((kind, open_path, body)) = stack.pop() else {
                    return Err(malformed(part, format!("block '{path}' closes nothing")));
                };
                if !path.is_empty() && path != open_path {
                    return Err(malformed(
                        part,
                        format!("blocks '{open_path}' and '{path}' overlap"),
                    ));
                }
                let segment = Segment::Block {
                    kind,
                    path: open_path,
                    body,
                };
                match stack.last_mut() {
                    Some((_, _, parent)) => parent.push(segment),
                    None => root.push(segment),
                }
            }
        }
    }

    if let Some((_, path, _)) = stack.pop() {
        return Err(malformed(part, format!("block '{path}' is never closed")));
    }
    Ok(root)
}

type OpenBlock = (BlockKind, String, Vec<Segment>);

fn current<'s>(stack: &'s mut [OpenBlock], root: &'s mut Vec<Segment>) -> &'s mut Vec<Segment> {
    match stack.last_mut() {
        Some((_, _, body)) => body,
        None => root,
    }
}

/// Frames a block contributes, one entry per iteration
///
/// Repeat yields one `Some(element)` per element (zero when the path is not
/// a sequence); conditionals yield a single `None` (no new frame) or nothing.
pub fn iterations<'a>(kind: BlockKind, path: &str, scope: &Scope<'a>) -> Vec<Option<&'a Value>> {
    let value = scope.resolve(path);
    match kind {
        BlockKind::Repeat => match value {
            Some(Value::Array(items)) => items.iter().map(Some).collect(),
            _ => Vec::new(),
        },
        BlockKind::Conditional if section_shown(value) => vec![None],
        BlockKind::Inverted if !section_shown(value) => vec![None],
        _ => Vec::new(),
    }
}

/// Render a segment tree
///
/// `field` writes a resolved value (or `None` for a missing path) to the output.
pub fn render<'a, F>(segments: &[Segment], scope: &mut Scope<'a>, out: &mut String, field: &mut F)
where
    F: FnMut(FieldKind, Option<&Value>, &mut String),
{
    for segment in segments {
        match segment {
            Segment::Raw(text) => out.push_str(text),
            Segment::Field(path) => field(FieldKind::Text, scope.resolve(path), out),
            Segment::Image(path) => field(FieldKind::Image, scope.resolve(path), out),
            Segment::Block { kind, path, body } => {
                for frame in iterations(*kind, path, scope) {
                    if let Some(value) = frame {
                        scope.push(value);
                    }
                    render(body, scope, out, field);
                    if frame.is_some() {
                        scope.pop();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{split_tags, Piece};
    use crate::model::field_text;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn text_field(kind: FieldKind, value: Option<&Value>, out: &mut String) {
        match (kind, value) {
            (FieldKind::Text, Some(value)) => out.push_str(&field_text(value)),
            (FieldKind::Image, Some(_)) => out.push_str("<img>"),
            (_, None) => {}
        }
    }

    fn raw(s: &str) -> Item {
        Item::Raw(s.to_string())
    }

    #[test]
    fn test_build_nested() {
        let items = vec![
            raw("a"),
            Item::Open {
                kind: BlockKind::Repeat,
                path: "xs".into(),
            },
            Item::Field(".".into()),
            Item::Close { path: "xs".into() },
            raw("b"),
            raw("c"),
        ];
        let tree = build("p", items).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[2], Segment::Raw("bc".into()));
    }

    #[test]
    fn test_build_overlap_fails() {
        let items = vec![
            Item::Open {
                kind: BlockKind::Repeat,
                path: "a".into(),
            },
            Item::Open {
                kind: BlockKind::Repeat,
                path: "b".into(),
            },
            Item::Close { path: "a".into() },
            Item::Close { path: "b".into() },
        ];
        assert!(build("p", items).is_err());
    }

    #[test]
    fn test_render_repeat_and_conditionals() {
        let data = json!({
            "items": [{ "name": "x", "vip": true }, { "name": "y", "vip": false }],
            "title": "T"
        });
        let tree = vec![
            Segment::Field("title".into()),
            Segment::Block {
                kind: BlockKind::Repeat,
                path: "items".into(),
                body: vec![
                    Segment::Raw("[".into()),
                    Segment::Field("name".into()),
                    Segment::Block {
                        kind: BlockKind::Conditional,
                        path: "vip".into(),
                        body: vec![Segment::Raw("*".into())],
                    },
                    Segment::Block {
                        kind: BlockKind::Inverted,
                        path: "vip".into(),
                        body: vec![Segment::Raw("-".into())],
                    },
                    Segment::Raw("]".into()),
                ],
            },
        ];

        let mut scope = Scope::new(&data);
        let mut out = String::new();
        render(&tree, &mut scope, &mut out, &mut text_field);
        assert_eq!(out, "T[x*][y-]");
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn test_items_from_tags() {
        let items: Vec<Item> = split_tags("{{#a}}{{b}}{{%logo}}{{^c}}{{/}}")
            .into_iter()
            .filter_map(|piece| match piece {
                Piece::Tag { tag, .. } => Some(Item::of(tag)),
                Piece::Text(_) => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                Item::Open {
                    kind: BlockKind::Repeat,
                    path: "a".into()
                },
                Item::Field("b".into()),
                Item::Image("logo".into()),
                Item::Open {
                    kind: BlockKind::Inverted,
                    path: "c".into()
                },
                Item::Close { path: String::new() },
            ]
        );
    }

    #[test]
    fn test_image_fields_reach_the_writer() {
        let data = json!({ "people": [{ "photo": "x" }, {}] });
        let tree = build(
            "p",
            vec![
                Item::Open {
                    kind: BlockKind::Repeat,
                    path: "people".into(),
                },
                raw("["),
                Item::Image("photo".into()),
                raw("]"),
                Item::Close { path: "people".into() },
            ],
        )
        .unwrap();
        let mut scope = Scope::new(&data);
        let mut out = String::new();
        render(&tree, &mut scope, &mut out, &mut text_field);
        assert_eq!(out, "[<img>][]");
    }

    #[test]
    fn test_repeat_over_non_sequence_is_empty() {
        let data = json!({ "items": "not a list" });
        let scope = Scope::new(&data);
        assert!(iterations(BlockKind::Repeat, "items", &scope).is_empty());
        assert!(iterations(BlockKind::Repeat, "missing", &scope).is_empty());
        assert_eq!(iterations(BlockKind::Inverted, "missing", &scope).len(), 1);
    }
}
