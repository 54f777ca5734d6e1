//! XML response struct.

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

/// Decoded XML document with its declaration settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlStruct {
	content_type: String,
	version: String,
	encoding: String,
	tree: MarkupTree,
}
impl XmlStruct {
	/// Creates an empty document declaring version `1.0` and `UTF-8`.
	pub fn new(content_type: impl Into<String>) -> Self {
		Self {
			content_type: content_type.into(),
			version: "1.0".into(),
			encoding: "UTF-8".into(),
			tree: MarkupTree::default(),
		}
	}

	/// Declared XML version.
	pub fn version(&self) -> &str {
		&self.version
	}

	/// Declared encoding.
	pub fn encoding(&self) -> &str {
		&self.encoding
	}

	/// Overrides the declared version.
	pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
		self.version = version.into();

		self
	}

	/// Overrides the declared encoding.
	pub fn set_encoding(&mut self, encoding: impl Into<String>) -> &mut Self {
		self.encoding = encoding.into();

		self
	}

	/// Root element.
	pub fn root(&self) -> Option<&Element> {
		self.tree.root.as_ref()
	}
}
impl ResponseStruct for XmlStruct {
	fn kind(&self) -> &'static str {
		"xml"
	}

	fn content_type(&self) -> &str {
		&self.content_type
	}

	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError> {
		let text = response.text();
		let text = text.trim_start_matches('\u{feff}').trim();

		if text.is_empty() {
			self.tree.root = None;

			return Ok(());
		}
		if let Some(decl) = declaration(text) {
			if let Some(version) = pseudo_attribute(decl, "version") {
				self.version = version.to_owned();
			}
			if let Some(encoding) = pseudo_attribute(decl, "encoding") {
				self.encoding = encoding.to_owned();
			}
		}

		let document = roxmltree::Document::parse(text)?;

		self.tree.root = Some(convert(document.root_element(), None));

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
impl Display for XmlStruct {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "<?xml version=\"{}\" encoding=\"{}\"?>", self.version, self.encoding)?;

		if let Some(root) = &self.tree.root {
			f.write_str(&root.to_markup(&[]))?;
		}

		Ok(())
	}
}

fn declaration(text: &str) -> Option<&str> {
	let body = text.strip_prefix("<?xml")?;

	body.find("?>").map(|end| &body[..end])
}

fn pseudo_attribute<'a>(decl: &'a str, name: &str) -> Option<&'a str> {
	let start = decl.find(name)? + name.len();
	let rest = decl[start..].trim_start().strip_prefix('=')?.trim_start();
	let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
	let rest = &rest[1..];

	rest.find(quote).map(|end| &rest[..end])
}

fn qualified(node: roxmltree::Node, namespace: Option<&str>, local: &str) -> String {
	match namespace.and_then(|uri| node.lookup_prefix(uri)) {
		Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
		_ => local.to_owned(),
	}
}

fn convert(node: roxmltree::Node, parent: Option<roxmltree::Node>) -> Element {
	let tag = node.tag_name();
	let mut element = Element::new(qualified(node, tag.namespace(), tag.name()));

	for ns in node.namespaces() {
		let inherited = parent
			.is_some_and(|p| {
				p.namespaces().any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
			});

		if inherited {
			continue;
		}

		match ns.name() {
			Some("xml") => {},
			Some(prefix) =>
				element.attributes.push((format!("xmlns:{prefix}"), ns.uri().to_owned())),
			None => element.attributes.push(("xmlns".into(), ns.uri().to_owned())),
		}
	}
	for attr in node.attributes() {
		let name = qualified(node, attr.namespace(), attr.name());

		element.attributes.push((name, attr.value().to_owned()));
	}
	for child in node.children() {
		if child.is_element() {
			element.children.push(MarkupNode::Element(convert(child, Some(node))));
		} else if let Some(text) = child.text().filter(|_| child.is_text()) {
			element.children.push(MarkupNode::Text(text.to_owned()));
		}
	}

	element
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn decoded(body: &str) -> XmlStruct {
		let mut content = XmlStruct::new("application/xml");

		content
			.decode(&RawResponse::new(200).with_body(body.as_bytes().to_vec()))
			.expect("Body should be well-formed XML.");

		content
	}

	#[test]
	fn declaration_settings_are_read_and_written() {
		let mut content = decoded(
			"<?xml version='1.0' encoding=\"ISO-8859-1\"?><user id=\"7\"><name>Ada</name></user>",
		);

		assert_eq!(content.version(), "1.0");
		assert_eq!(content.encoding(), "ISO-8859-1");
		assert_eq!(content.get(&"name".into()), Some(Value::String("Ada".into())));
		assert_eq!(content.get(&"/user/@id".into()), Some(Value::String("7".into())));

		content.set_version("1.1").set_encoding("UTF-8");
		content.set(&"name".into(), Value::String("Grace & co".into())).expect("Name exists.");

		assert_eq!(
			content.to_string(),
			concat!(
				"<?xml version=\"1.1\" encoding=\"UTF-8\"?>",
				"<user id=\"7\"><name>Grace &amp; co</name></user>",
			)
		);
	}

	#[test]
	fn prefixes_survive_the_round_trip() {
		let content = decoded(
			r#"<s:Envelope xmlns:s="urn:soap"><s:Body><Result>ok</Result></s:Body></s:Envelope>"#,
		);

		assert_eq!(content.get(&"//Result".into()), Some(Value::String("ok".into())));
		assert_eq!(content.get(&"/Envelope/Body/Result".into()), Some(Value::String("ok".into())));
		assert_eq!(
			content.to_string(),
			concat!(
				r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="urn:soap">"#,
				"<s:Body><Result>ok</Result></s:Body></s:Envelope>",
			)
		);
	}

	#[test]
	fn malformed_xml_is_a_decode_error() {
		let mut content = XmlStruct::new("text/xml");

		assert!(matches!(
			content.decode(&RawResponse::new(200).with_body(b"<open>".to_vec())),
			Err(DecodeError::Xml(_))
		));
	}
}
