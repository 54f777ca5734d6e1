//! HTML response struct.

// crates.io
use scraper::{ElementRef, Html, Node};
// self
use crate::{
	_prelude::*,
	error::DecodeError,
	http::RawResponse,
	response::{
		Offset, ResponseStruct,
		markup::{Element, MarkupNode, MarkupTree},
	},
};

const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

/// Decoded HTML document rooted at `<html>`.
///
/// Parsing is lenient: malformed markup is repaired the way browsers do, so decoding only fails
/// on bodies that are not text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtmlStruct {
	content_type: String,
	tree: MarkupTree,
}
impl HtmlStruct {
	/// Creates an empty document.
	pub fn new(content_type: impl Into<String>) -> Self {
		Self { content_type: content_type.into(), tree: MarkupTree::default() }
	}

	/// Root element.
	pub fn root(&self) -> Option<&Element> {
		self.tree.root.as_ref()
	}
}
impl ResponseStruct for HtmlStruct {
	fn kind(&self) -> &'static str {
		"html"
	}

	fn content_type(&self) -> &str {
		&self.content_type
	}

	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError> {
		let text = std::str::from_utf8(&response.body)
			.map_err(|_| DecodeError::Incompatible { expected: "UTF-8 text" })?;

		if text.trim().is_empty() {
			self.tree.root = None;

			return Ok(());
		}

		let document = Html::parse_document(text);

		self.tree.root = Some(convert(document.root_element()));

		Ok(())
	}

	fn get(&self, offset: &Offset) -> Option<Value> {
		self.tree.get(offset)
	}

	fn set(&mut self, offset: &Offset, value: Value) -> Result<(), DecodeError> {
		self.tree.set(offset, value)
	}

	fn unset(&mut self, offset: &Offset) -> Result<(), DecodeError> {
		self.tree.unset(offset)
	}

	fn count(&self) -> usize {
		self.tree.count()
	}

	fn items(&self) -> Vec<Value> {
		self.tree.items()
	}

	fn to_value(&self) -> Value {
		self.tree.to_value()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
impl Display for HtmlStruct {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if let Some(root) = &self.tree.root {
			f.write_str("<!DOCTYPE html>")?;
			f.write_str(&root.to_markup(VOID_ELEMENTS))?;
		}

		Ok(())
	}
}

fn convert(element: ElementRef) -> Element {
	let value = element.value();
	let mut out = Element::new(value.name());

	out.attributes = value.attrs().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();

	for child in element.children() {
		match child.value() {
			Node::Element(_) =>
				if let Some(child) = ElementRef::wrap(child) {
					out.children.push(MarkupNode::Element(convert(child)));
				},
			Node::Text(text) => out.children.push(MarkupNode::Text(String::from(&**text))),
			_ => {},
		}
	}

	out
}
