//! Persisted math fragments.
//!
//! In the stored document a math instance is a container element (a
//! `span.math-tex` by default) whose only child is a text node holding the
//! HTML-encoded raw authored math, delimiters included:
//!
//! ```html
//! <span class="math-tex">\(x &lt; 1\)</span>
//! ```
//!
//! The codec works against the small [`HostElement`] trait so it can sit on
//! top of any document tree. [`Element`] is a plain in-memory implementation.

use std::borrow::Cow;

use markdown_weaver_escape::escape_html;
use quick_xml::escape::unescape_with;
use smol_str::SmolStr;

use crate::error::{MathError, RejectReason, Result};
use crate::grammar::{self, DelimiterRule, Expression};

/// Attribute mirroring the verbatim raw math.
pub const MATH_ATTR: &str = "data-math";
/// Attribute mirroring the display mode as `"true"`/`"false"`.
pub const DISPLAY_MODE_ATTR: &str = "data-math-display-mode";

/// What a child of a host element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Text,
    Element,
}

/// The parts of a document tree element the codec needs.
///
/// Text content is exchanged in its stored (HTML-encoded) form.
pub trait HostElement {
    /// Tag name, lowercase.
    fn name(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&str>;

    fn set_attribute(&mut self, name: &str, value: &str);

    fn child_count(&self) -> usize;

    fn child_kind(&self, index: usize) -> Option<ChildKind>;

    /// Stored text of the child at `index`, if it is a text node.
    fn child_text(&self, index: usize) -> Option<&str>;

    /// Replace the child at `index` with a text node, or append one if
    /// `index` is past the end.
    fn replace_child_with_text(&mut self, index: usize, text: String);

    fn remove_child(&mut self, index: usize);

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }
}

/// A child of an in-memory [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Stored (HTML-encoded) text.
    Text(String),
    Element(Element),
}

/// Minimal in-memory document element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: SmolStr,
    /// Attribute values, unescaped, in insertion order.
    pub attributes: Vec<(SmolStr, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, &value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Serialize to HTML. Attribute values are escaped, text is written as stored.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            // Writing to a String can't fail
            let _ = escape_html(&mut *out, value);
            out.push('"');
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.write_html(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl HostElement for Element {
    fn name(&self) -> &str {
        &self.name
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attributes.push((name.into(), value.to_string())),
        }
    }

    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn child_kind(&self, index: usize) -> Option<ChildKind> {
        self.children.get(index).map(|child| match child {
            Node::Text(_) => ChildKind::Text,
            Node::Element(_) => ChildKind::Element,
        })
    }

    fn child_text(&self, index: usize) -> Option<&str> {
        match self.children.get(index)? {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }

    fn replace_child_with_text(&mut self, index: usize, text: String) {
        match self.children.get_mut(index) {
            Some(child) => *child = Node::Text(text),
            None => self.children.push(Node::Text(text)),
        }
    }

    fn remove_child(&mut self, index: usize) {
        if index < self.children.len() {
            self.children.remove(index);
        }
    }
}

/// A math instance read from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMath {
    /// Verbatim raw authored math, delimiters included.
    pub raw: String,
    pub expression: Expression,
}

impl DecodedMath {
    /// Parse `raw` with `rules`, keeping `raw` as authored.
    pub fn from_raw(raw: impl Into<String>, rules: &[DelimiterRule]) -> Self {
        let raw = raw.into();
        let expression = grammar::parse(&raw, rules);
        Self { raw, expression }
    }
}

/// HTML-encode text for storage in a text node.
pub fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing to a String can't fail
    let _ = escape_html(&mut out, text);
    out
}

fn resolve_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        _ => None,
    }
}

/// Decode stored text. Handles the XML entities, `&nbsp;` and numeric
/// character references.
///
/// A bare `&` (TeX alignment) or an unknown named entity is kept literally.
/// Returns `None` only for a character reference to an invalid code point.
pub fn decode_text(stored: &str) -> Option<Cow<'_, str>> {
    if !stored.contains('&') {
        return Some(Cow::Borrowed(stored));
    }

    let mut out = String::with_capacity(stored.len());
    let mut rest = stored;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        // `&name;` with nothing that can't appear in a reference before the `;`
        let reference_len = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .filter(|&end| tail[1 + end..].starts_with(';'))
            .map(|end| end + 2);

        let Some(len) = reference_len else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let reference = &tail[..len];
        match unescape_with(reference, resolve_entity) {
            Ok(decoded) => out.push_str(&decoded),
            Err(_) if reference[1..].starts_with('#') => return None,
            Err(_) => out.push_str(reference),
        }
        rest = &tail[len..];
    }
    out.push_str(rest);
    Some(Cow::Owned(out))
}

/// Read a fragment as math.
///
/// The fragment must hold exactly one text child whose decoded content
/// parses to a non-empty expression.
pub fn decode(fragment: &impl HostElement, rules: &[DelimiterRule]) -> Result<DecodedMath> {
    let reject = |reason| Err(MathError::DecodeRejected(reason));
    match fragment.child_count() {
        0 => return reject(RejectReason::NoContent),
        1 => {}
        _ => return reject(RejectReason::MultipleChildren),
    }
    let Some(stored) = fragment.child_text(0) else {
        return reject(RejectReason::NotText);
    };
    let Some(raw) = decode_text(stored) else {
        return reject(RejectReason::Undecodable);
    };

    let math = DecodedMath::from_raw(raw, rules);
    if math.expression.is_empty() {
        return reject(RejectReason::EmptyExpression);
    }
    Ok(math)
}

/// Recognize a math element while loading a document.
///
/// Returns `None` for elements that are not `span.{class}` or that do not
/// decode. A math span with an empty expression has its text removed.
pub fn upcast(
    element: &mut impl HostElement,
    class: &str,
    rules: &[DelimiterRule],
) -> Option<DecodedMath> {
    if element.name() != "span" || !element.has_class(class) {
        return None;
    }
    match decode(element, rules) {
        Ok(math) => Some(math),
        Err(MathError::DecodeRejected(reason)) => {
            tracing::debug!(
                target: "weaver::math::document",
                %reason,
                "treating math span as plain content"
            );
            if reason == RejectReason::EmptyExpression {
                element.remove_child(0);
            }
            None
        }
        Err(err) => {
            tracing::warn!(
                target: "weaver::math::document",
                error = %err,
                "unexpected decode error"
            );
            None
        }
    }
}

/// Write `math` back into its fragment.
///
/// Only the text child is replaced; attributes are left alone.
pub fn encode(math: &DecodedMath, fragment: &mut impl HostElement) {
    fragment.replace_child_with_text(0, encode_text(&math.raw));
}

/// Mirror `math` into the persisted attributes of its wrapper.
pub fn sync_attributes(math: &DecodedMath, wrapper: &mut impl HostElement) {
    wrapper.set_attribute(MATH_ATTR, &math.raw);
    wrapper.set_attribute(
        DISPLAY_MODE_ATTR,
        if math.expression.display_mode {
            "true"
        } else {
            "false"
        },
    );
}
