//! Flat XML tokenizer
//!
//! Parts are tokenized into a flat list of start/end/empty/text tokens that
//! remember their byte span in the source. Renderers splice the original
//! bytes back together and only re-serialize the tokens they change, so
//! untouched markup keeps its exact formatting.

use crate::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::ops::Range;

/// Kind of a flat XML token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `<name ...>`
    Start,
    /// `</name>`
    End,
    /// `<name ... />`
    Empty,
    /// Character data, including entity references
    Text,
    /// Declarations, comments, processing instructions, CDATA
    Other,
}

/// A single token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct XmlToken {
    pub kind: TokenKind,
    /// Qualified element name (e.g. `w:p`); empty for non-element tokens
    pub qname: String,
    /// Byte range of the token in the source text
    pub span: Range<usize>,
    /// Unescaped attributes in source order (start and empty tokens only)
    pub attributes: Vec<(String, String)>,
}

impl XmlToken {
    /// Element name without namespace prefix
    pub fn local_name(&self) -> &str {
        self.qname.rsplit(':').next().unwrap_or("")
    }

    /// True for a start tag with the given local name
    pub fn is_start(&self, local: &str) -> bool {
        self.kind == TokenKind::Start && self.local_name() == local
    }

    /// True for an end tag with the given local name
    pub fn is_end(&self, local: &str) -> bool {
        self.kind == TokenKind::End && self.local_name() == local
    }

    /// True for a start or empty tag with the given local name
    pub fn opens(&self, local: &str) -> bool {
        matches!(self.kind, TokenKind::Start | TokenKind::Empty) && self.local_name() == local
    }

    /// Look up an attribute by its qualified name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or append) an attribute
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Original source text of this token
    pub fn raw<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.clone()]
    }

    /// Serialize a start or empty tag from the current attributes
    pub fn to_tag(&self) -> String {
        start_tag(&self.qname, &self.attributes, self.kind == TokenKind::Empty)
    }
}

/// Tokenize an XML document
pub fn tokenize(xml: &str) -> Result<Vec<XmlToken>> {
    let mut reader = Reader::from_str(xml);
    let mut tokens: Vec<XmlToken> = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;

        let (kind, qname, attributes) = match event {
            Event::Eof => break,
            Event::Start(e) => (TokenKind::Start, qualified_name(&e), read_attributes(&e)?),
            Event::Empty(e) => (TokenKind::Empty, qualified_name(&e), read_attributes(&e)?),
            Event::End(e) => (
                TokenKind::End,
                String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                Vec::new(),
            ),
            Event::Text(_) | Event::GeneralRef(_) => {
                // Entity references arrive as separate events; fold them into one text token
                if let Some(last) = tokens.last_mut() {
                    if last.kind == TokenKind::Text && last.span.end == start {
                        last.span.end = end;
                        continue;
                    }
                }
                (TokenKind::Text, String::new(), Vec::new())
            }
            _ => (TokenKind::Other, String::new(), Vec::new()),
        };

        tokens.push(XmlToken {
            kind,
            qname,
            span: start..end,
            attributes,
        });
    }

    Ok(tokens)
}

/// For every token, the index of the start tag of its enclosing element
pub fn parent_indices(tokens: &[XmlToken]) -> Vec<Option<usize>> {
    let mut parents = Vec::with_capacity(tokens.len());
    let mut stack: Vec<usize> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::End => {
                stack.pop();
                parents.push(stack.last().copied());
            }
            TokenKind::Start => {
                parents.push(stack.last().copied());
                stack.push(i);
            }
            _ => parents.push(stack.last().copied()),
        }
    }

    parents
}

/// Map each start tag to its end tag and each end tag back to its start tag
pub fn element_pairs(tokens: &[XmlToken]) -> Vec<Option<usize>> {
    let mut pairs = vec![None; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Start => stack.push(i),
            TokenKind::End => {
                if let Some(open) = stack.pop() {
                    pairs[open] = Some(i);
                    pairs[i] = Some(open);
                }
            }
            _ => {}
        }
    }

    pairs
}

/// Escape character data
pub fn escape_text(text: &str) -> Cow<'_, str> {
    quick_xml::escape::partial_escape(text)
}

/// Unescape character data (entity and character references)
pub fn unescape_text(raw: &str) -> Result<Cow<'_, str>> {
    Ok(quick_xml::escape::unescape(raw).map_err(quick_xml::Error::from)?)
}

/// Serialize a start (or empty) tag
pub fn start_tag(qname: &str, attributes: &[(String, String)], empty: bool) -> String {
    let mut tag = String::with_capacity(qname.len() + 2 + attributes.len() * 16);
    tag.push('<');
    tag.push_str(qname);
    for (key, value) in attributes {
        tag.push(' ');
        tag.push_str(key);
        tag.push_str("=\"");
        tag.push_str(&quick_xml::escape::escape(value.as_str()));
        tag.push('"');
    }
    if empty {
        tag.push('/');
    }
    tag.push('>');
    tag
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_preserves_spans() {
        let xml = r#"<?xml version="1.0"?><w:p a="1"><w:t>Hi &amp; bye</w:t><w:br/></w:p>"#;
        let tokens = tokenize(xml).unwrap();

        let rebuilt: String = tokens.iter().map(|t| t.raw(xml)).collect();
        assert_eq!(rebuilt, xml);

        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Other,
                TokenKind::Start,
                TokenKind::Start,
                TokenKind::Text,
                TokenKind::End,
                TokenKind::Empty,
                TokenKind::End,
            ]
        );
        assert_eq!(tokens[3].raw(xml), "Hi &amp; bye");
        assert_eq!(tokens[1].attribute("a"), Some("1"));
        assert!(tokens[2].is_start("t"));
    }

    #[test]
    fn test_parents_and_pairs() {
        let xml = "<a><b><c/></b><d>x</d></a>";
        let tokens = tokenize(xml).unwrap();
        let parents = parent_indices(&tokens);
        let pairs = element_pairs(&tokens);

        // <a> <b> <c/> </b> <d> x </d> </a>
        assert_eq!(parents[0], None);
        assert_eq!(parents[2], Some(1));
        assert_eq!(parents[3], Some(0));
        assert_eq!(parents[5], Some(4));
        assert_eq!(pairs[0], Some(7));
        assert_eq!(pairs[4], Some(6));
        assert_eq!(pairs[6], Some(4));
    }

    #[test]
    fn test_start_tag_escapes_attributes() {
        let tag = start_tag("c", &[("r".into(), "A1".into()), ("n".into(), "a\"b".into())], true);
        assert_eq!(tag, r#"<c r="A1" n="a&quot;b"/>"#);
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text("a &lt; b &#65;").unwrap(), "a < b A");
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }
}
