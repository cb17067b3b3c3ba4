//! Streaming outline pass over raw XML, built on `quick-xml`.
//!
//! The KML reader builds its tree recursively, so every document is walked
//! here first with a flat event loop: malformed markup and runaway nesting
//! are rejected before any tree exists.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

/// Deepest element nesting accepted in an uploaded document.
pub const MAX_DEPTH: usize = 256;

/// Errors from [`scan`].
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Syntax error reported by the reader.
    #[error("{0}")]
    Syntax(#[from] quick_xml::Error),

    /// Input ended with elements still open.
    #[error("unexpected end of document inside <{0}>")]
    Unclosed(String),

    /// Input has no root element.
    #[error("document has no root element")]
    NoRoot,

    /// Elements nest past the accepted depth.
    #[error("document nests elements deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// What a successful [`scan`] learned about a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outline {
    /// Deepest nesting seen, the root counting as one.
    pub depth: usize,
    /// Number of `Placemark` elements, at any depth.
    pub placemarks: usize,
}

/// Walks `text` once without building a tree.
///
/// # Errors
///
/// * If the reader reports a syntax error or mismatched end tag
/// * If elements nest deeper than `limit`
/// * If the document ends before the root closes, or has no root
pub fn scan(text: &str, limit: usize) -> Result<Outline, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut open: Vec<String> = Vec::new();
    let mut outline = Outline::default();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                visit(&start, open.len(), limit, &mut outline)?;
                open.push(local_name(&start));
                seen_root = true;
            }
            Event::Empty(start) => {
                visit(&start, open.len(), limit, &mut outline)?;
                seen_root = true;
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Eof => {
                return match open.pop() {
                    Some(name) => Err(XmlError::Unclosed(name)),
                    None if seen_root => Ok(outline),
                    None => Err(XmlError::NoRoot),
                };
            }
            _ => {}
        }
    }
}

fn visit(
    start: &BytesStart<'_>,
    parents: usize,
    limit: usize,
    outline: &mut Outline,
) -> Result<(), XmlError> {
    let depth = parents + 1;
    if depth > limit {
        return Err(XmlError::TooDeep { limit });
    }
    outline.depth = outline.depth.max(depth);
    if start.local_name().as_ref() == b"Placemark" {
        outline.placemarks += 1;
    }
    Ok(())
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}
