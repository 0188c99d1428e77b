//! Text extraction from service XML and embedded HTML.
//!
//! XML responses are parsed with `roxmltree`. Element lookups compare
//! local names only, so namespace prefixes in SOAP-style responses do not
//! matter. Comment fields that carry HTML are flattened with `scraper`.

use roxmltree::{Document, Node};
use scraper::Html;

use crate::TaxonomyError;

/// Elements that separate words when HTML is flattened to text.
const BLOCK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "li", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Parses an XML response body.
///
/// # Errors
///
/// Returns [`TaxonomyError::Parse`] if the body is not well-formed XML.
pub fn parse_xml(xml: &str) -> Result<Document<'_>, TaxonomyError> {
    Document::parse(xml).map_err(|e| TaxonomyError::Parse {
        message: format!("invalid XML response: {e}"),
    })
}

/// Flattens an HTML fragment to text and collapses runs of whitespace.
///
/// Character references are decoded. Returns `None` if nothing but
/// whitespace remains.
#[must_use]
pub fn strip_html(text: &str) -> Option<String> {
    let fragment = Html::parse_fragment(text);
    let mut flat = String::with_capacity(text.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            scraper::Node::Text(t) => flat.push_str(t),
            scraper::Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()) => flat.push(' '),
            _ => {}
        }
    }

    let collapsed = flat.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn is_named(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

/// Concatenated, trimmed text content of `node`, CDATA included.
fn text_of(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Returns the text of every element named `name` below `node`.
#[must_use]
pub fn element_texts(node: Node<'_, '_>, name: &str) -> Vec<String> {
    node.descendants()
        .filter(|n| is_named(n, name))
        .map(text_of)
        .collect()
}

/// Returns the first non-empty text of an element named `name`.
#[must_use]
pub fn first_element_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    element_texts(node, name).into_iter().find(|s| !s.is_empty())
}

/// Returns the first `name` element whose `attr` attribute equals `value`.
#[must_use]
pub fn element_with_attr<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
    attr: &str,
    value: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|n| is_named(n, name) && n.attribute(attr) == Some(value))
}
