//! Owned element tree shared by the XML and HTML structs, plus the path-query subset used to
//! address it.
//!
//! Supported query syntax: `/a/b` (absolute), `a/b` (relative to the root element), `//b`
//! (descendants), `*`, `[n]` (1-based position), `[@attr]`, `[@attr='v']`, and a trailing
//! `@attr` step selecting an attribute.

// self
use crate::{_prelude::*, error::DecodeError, response::Offset};

/// Child of an [`Element`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkupNode {
	/// Nested element.
	Element(Element),
	/// Character data.
	Text(String),
}

/// Element with qualified name, attributes in document order, and children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
	/// Qualified name (`prefix:local` when prefixed).
	pub name: String,
	/// Attributes, including namespace declarations.
	pub attributes: Vec<(String, String)>,
	/// Child nodes.
	pub children: Vec<MarkupNode>,
}
impl Element {
	/// Creates an empty element.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
	}

	/// Attribute value.
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	/// Sets or replaces an attribute.
	pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
		let value = value.into();

		match self.attributes.iter_mut().find(|(key, _)| key == name) {
			Some((_, existing)) => *existing = value,
			None => self.attributes.push((name.to_owned(), value)),
		}
	}

	/// Removes an attribute.
	pub fn remove_attribute(&mut self, name: &str) {
		self.attributes.retain(|(key, _)| key != name);
	}

	/// Concatenated descendant text.
	pub fn text(&self) -> String {
		let mut out = String::new();

		self.collect_text(&mut out);

		out
	}

	/// Replaces every child with a single text node.
	pub fn set_text(&mut self, text: impl Into<String>) {
		self.children = vec![MarkupNode::Text(text.into())];
	}

	/// Element children with their positions in [`Element::children`].
	pub fn elements(&self) -> impl Iterator<Item = (usize, &Element)> {
		self.children.iter().enumerate().filter_map(|(idx, child)| match child {
			MarkupNode::Element(element) => Some((idx, element)),
			MarkupNode::Text(_) => None,
		})
	}

	/// Returns `true` when the element has element children.
	pub fn has_elements(&self) -> bool {
		self.elements().next().is_some()
	}

	/// Leaf elements become their text; others become their markup.
	pub fn to_value(&self) -> Value {
		if self.has_elements() {
			Value::String(self.to_markup(&[]))
		} else {
			Value::String(self.text())
		}
	}

	/// Serializes the element; names in `void` are written without a closing tag.
	pub fn to_markup(&self, void: &[&str]) -> String {
		let mut out = String::new();

		self.write_markup(&mut out, void);

		out
	}

	fn collect_text(&self, out: &mut String) {
		for child in &self.children {
			match child {
				MarkupNode::Text(text) => out.push_str(text),
				MarkupNode::Element(element) => element.collect_text(out),
			}
		}
	}

	fn write_markup(&self, out: &mut String, void: &[&str]) {
		out.push('<');
		out.push_str(&self.name);

		for (name, value) in &self.attributes {
			out.push(' ');
			out.push_str(name);
			out.push_str("=\"");
			out.push_str(&escape(value, true));
			out.push('"');
		}

		if void.iter().any(|v| v.eq_ignore_ascii_case(&self.name)) {
			out.push('>');

			return;
		}
		if self.children.is_empty() && void.is_empty() {
			out.push_str("/>");

			return;
		}

		out.push('>');

		for child in &self.children {
			match child {
				MarkupNode::Text(text) => out.push_str(&escape(text, false)),
				MarkupNode::Element(element) => element.write_markup(out, void),
			}
		}

		out.push_str("</");
		out.push_str(&self.name);
		out.push('>');
	}

	fn node(&self, path: &[usize]) -> Option<&Element> {
		path.iter().try_fold(self, |current, idx| match current.children.get(*idx)? {
			MarkupNode::Element(element) => Some(element),
			MarkupNode::Text(_) => None,
		})
	}

	fn node_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
		path.iter().try_fold(self, |current, idx| match current.children.get_mut(*idx)? {
			MarkupNode::Element(element) => Some(element),
			MarkupNode::Text(_) => None,
		})
	}
}

/// Escapes character data, and quotes as well for attribute values.
pub fn escape(text: &str, attribute: bool) -> String {
	let mut out = String::with_capacity(text.len());

	for ch in text.chars() {
		match ch {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' if attribute => out.push_str("&quot;"),
			_ => out.push(ch),
		}
	}

	out
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum NameTest {
	Any,
	Name(String),
}
impl NameTest {
	fn matches(&self, element: &Element) -> bool {
		match self {
			NameTest::Any => true,
			NameTest::Name(name) =>
				element.name == *name
					|| (!name.contains(':')
						&& element.name.rsplit(':').next().is_some_and(|local| local == name)),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Predicate {
	Position(usize),
	HasAttr(String),
	AttrEq(String, String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Step {
	descendant: bool,
	test: NameTest,
	predicates: Vec<Predicate>,
}

/// Parsed path query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
	absolute: bool,
	steps: Vec<Step>,
	attribute: Option<String>,
}
impl Query {
	/// Parses `raw`.
	pub fn parse(raw: &str) -> Result<Self, DecodeError> {
		let invalid = || DecodeError::Query { query: raw.to_owned() };
		let trimmed = raw.trim();
		let absolute = trimmed.starts_with('/');
		let mut rest = trimmed;
		let mut steps = Vec::new();
		let mut attribute = None;
		let mut first = true;

		while !rest.is_empty() {
			let descendant = if let Some(after) = rest.strip_prefix("//") {
				rest = after;

				true
			} else if let Some(after) = rest.strip_prefix('/') {
				rest = after;

				false
			} else if first {
				false
			} else {
				return Err(invalid());
			};

			first = false;

			let end = step_end(rest);
			let (segment, tail) = rest.split_at(end);

			rest = tail;

			if let Some(name) = segment.strip_prefix('@') {
				if name.is_empty() || !rest.is_empty() {
					return Err(invalid());
				}

				attribute = Some(name.to_owned());

				break;
			}

			steps.push(parse_step(segment, descendant).ok_or_else(invalid)?);
		}

		if steps.is_empty() && attribute.is_none() {
			return Err(invalid());
		}

		Ok(Self { absolute, steps, attribute })
	}

	/// Attribute selected by a trailing `@attr` step.
	pub fn attribute(&self) -> Option<&str> {
		self.attribute.as_deref()
	}

	/// Child paths (positions within `children`, from the root) of every matched element, in
	/// document order.
	pub fn select(&self, root: &Element) -> Vec<Vec<usize>> {
		// `None` stands for the document node above the root element.
		let mut context: Vec<Option<Vec<usize>>> =
			if self.absolute { vec![None] } else { vec![Some(Vec::new())] };

		for step in &self.steps {
			let mut next = Vec::<Vec<usize>>::new();

			for ctx in &context {
				let candidates = candidates(root, ctx.as_deref(), step);

				for path in apply_predicates(root, candidates, &step.predicates) {
					if !next.contains(&path) {
						next.push(path);
					}
				}
			}

			context = next.into_iter().map(Some).collect();
		}

		context.into_iter().flatten().collect()
	}
}

fn step_end(rest: &str) -> usize {
	let mut depth = 0_usize;
	let mut quote = None;

	for (idx, ch) in rest.char_indices() {
		match (ch, quote) {
			('\'' | '"', None) => quote = Some(ch),
			(c, Some(q)) if c == q => quote = None,
			('[', None) => depth += 1,
			(']', None) => depth = depth.saturating_sub(1),
			('/', None) if depth == 0 => return idx,
			_ => {},
		}
	}

	rest.len()
}

fn parse_step(segment: &str, descendant: bool) -> Option<Step> {
	let (name, mut rest) = match segment.find('[') {
		Some(idx) => segment.split_at(idx),
		None => (segment, ""),
	};
	let test = match name.trim() {
		"" => return None,
		"*" => NameTest::Any,
		name => NameTest::Name(name.to_owned()),
	};
	let mut predicates = Vec::new();

	while let Some(body) = rest.strip_prefix('[') {
		let close = body.find(']')?;

		predicates.push(parse_predicate(body[..close].trim())?);
		rest = &body[close + 1..];
	}

	rest.is_empty().then_some(Step { descendant, test, predicates })
}

fn parse_predicate(raw: &str) -> Option<Predicate> {
	if let Ok(position) = raw.parse::<usize>() {
		return (position > 0).then_some(Predicate::Position(position));
	}

	let attr = raw.strip_prefix('@')?;

	match attr.split_once('=') {
		None => Some(Predicate::HasAttr(attr.trim().to_owned())),
		Some((name, value)) => {
			let value = value.trim();
			let unquoted = value
				.strip_prefix('\'')
				.and_then(|v| v.strip_suffix('\''))
				.or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))?;

			Some(Predicate::AttrEq(name.trim().to_owned(), unquoted.to_owned()))
		},
	}
}

fn candidates(root: &Element, ctx: Option<&[usize]>, step: &Step) -> Vec<Vec<usize>> {
	let mut out = Vec::new();

	match ctx {
		None => {
			if step.test.matches(root) {
				out.push(Vec::new());
			}
			if step.descendant {
				collect_descendants(root, &mut Vec::new(), &step.test, &mut out);
			}
		},
		Some(path) => {
			let Some(element) = root.node(path) else {
				return out;
			};
			let mut prefix = path.to_vec();

			if step.descendant {
				collect_descendants(element, &mut prefix, &step.test, &mut out);
			} else {
				for (idx, child) in element.elements() {
					if step.test.matches(child) {
						prefix.push(idx);
						out.push(prefix.clone());
						prefix.pop();
					}
				}
			}
		},
	}

	out
}

fn collect_descendants(
	element: &Element,
	prefix: &mut Vec<usize>,
	test: &NameTest,
	out: &mut Vec<Vec<usize>>,
) {
	for (idx, child) in element.elements() {
		prefix.push(idx);

		if test.matches(child) {
			out.push(prefix.clone());
		}

		collect_descendants(child, prefix, test, out);
		prefix.pop();
	}
}

fn apply_predicates(
	root: &Element,
	mut paths: Vec<Vec<usize>>,
	predicates: &[Predicate],
) -> Vec<Vec<usize>> {
	for predicate in predicates {
		paths = match predicate {
			Predicate::Position(position) =>
				paths.into_iter().nth(position - 1).into_iter().collect(),
			Predicate::HasAttr(name) => paths
				.into_iter()
				.filter(|path| root.node(path).is_some_and(|e| e.attribute(name).is_some()))
				.collect(),
			Predicate::AttrEq(name, value) => paths
				.into_iter()
				.filter(|path| root.node(path).is_some_and(|e| e.attribute(name) == Some(value)))
				.collect(),
		};
	}

	paths
}

/// Offset-addressed access over an optional root element; the XML and HTML structs delegate
/// here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarkupTree {
	/// Root element, `None` for an empty document.
	pub root: Option<Element>,
}
impl MarkupTree {
	/// Value at `offset`: text for leaves, markup otherwise; a list when several elements match.
	pub fn get(&self, offset: &Offset) -> Option<Value> {
		let root = self.root.as_ref()?;

		match offset {
			Offset::Index(idx) => root.elements().nth(*idx).map(|(_, e)| e.to_value()),
			Offset::Key(raw) => {
				let query = Query::parse(raw).ok()?;
				let values = query
					.select(root)
					.iter()
					.filter_map(|path| root.node(path))
					.filter_map(|element| match query.attribute() {
						Some(name) => element.attribute(name).map(|v| Value::String(v.to_owned())),
						None => Some(element.to_value()),
					})
					.collect::<Vec<_>>();

				match values.len() {
					0 => None,
					1 => values.into_iter().next(),
					_ => Some(Value::Array(values)),
				}
			},
		}
	}

	/// Sets the text (or attribute) of every match; a missing single-name child of the root is
	/// appended.
	pub fn set(&mut self, offset: &Offset, value: Value) -> Result<(), DecodeError> {
		let text = match value {
			Value::String(text) => text,
			Value::Null => String::new(),
			other => other.to_string(),
		};
		let root = self.root.as_mut().ok_or(DecodeError::InvalidOffset {
			offset: offset.to_string(),
			reason: "document is empty",
		})?;

		match offset {
			Offset::Index(idx) => {
				let position = root.elements().nth(*idx).map(|(pos, _)| pos).ok_or_else(|| {
					DecodeError::InvalidOffset {
						offset: offset.to_string(),
						reason: "root has no child at this index",
					}
				})?;

				if let Some(MarkupNode::Element(element)) = root.children.get_mut(position) {
					element.set_text(text);
				}
			},
			Offset::Key(raw) => {
				let query = Query::parse(raw)?;
				let paths = query.select(root);

				if paths.is_empty() {
					return append_child(root, raw, &query, text);
				}

				for path in paths {
					if let Some(element) = root.node_mut(&path) {
						match query.attribute() {
							Some(name) => element.set_attribute(name, text.clone()),
							None => element.set_text(text.clone()),
						}
					}
				}
			},
		}

		Ok(())
	}

	/// Removes every matched element (or attribute).
	pub fn unset(&mut self, offset: &Offset) -> Result<(), DecodeError> {
		let Some(root) = self.root.as_mut() else {
			return Ok(());
		};

		match offset {
			Offset::Index(idx) => {
				let found = root.elements().nth(*idx).map(|(pos, _)| pos);

				if let Some(position) = found {
					root.children.remove(position);
				}
			},
			Offset::Key(raw) => {
				let query = Query::parse(raw)?;
				let mut paths = query.select(root);

				if let Some(name) = query.attribute() {
					for path in paths {
						if let Some(element) = root.node_mut(&path) {
							element.remove_attribute(name);
						}
					}

					return Ok(());
				}
				if paths.iter().any(Vec::is_empty) {
					return Err(DecodeError::InvalidOffset {
						offset: offset.to_string(),
						reason: "the root element cannot be removed",
					});
				}

				// Later siblings first so earlier positions stay valid.
				paths.sort();

				for path in paths.iter().rev() {
					let (last, parent) = path.split_last().unwrap_or((&0, &[]));

					if let Some(parent) = root.node_mut(parent)
						&& *last < parent.children.len()
					{
						parent.children.remove(*last);
					}
				}
			},
		}

		Ok(())
	}

	/// Number of element children of the root.
	pub fn count(&self) -> usize {
		self.root.as_ref().map(|root| root.elements().count()).unwrap_or_default()
	}

	/// Element children of the root as values.
	pub fn items(&self) -> Vec<Value> {
		self.root
			.as_ref()
			.map(|root| root.elements().map(|(_, e)| e.to_value()).collect())
			.unwrap_or_default()
	}

	/// Structured JSON view: `{ name, attributes, children }` with text children as strings.
	pub fn to_value(&self) -> Value {
		self.root.as_ref().map(element_json).unwrap_or(Value::Null)
	}
}

fn append_child(
	root: &mut Element,
	raw: &str,
	query: &Query,
	text: String,
) -> Result<(), DecodeError> {
	match (query.absolute, query.steps.as_slice(), query.attribute()) {
		(false, [], Some(name)) => root.set_attribute(name, text),
		(false, [Step { descendant: false, test: NameTest::Name(name), predicates }], None)
			if predicates.is_empty() =>
		{
			let mut element = Element::new(name.clone());

			element.set_text(text);
			root.children.push(MarkupNode::Element(element));
		},
		_ =>
			return Err(DecodeError::InvalidOffset {
				offset: raw.to_owned(),
				reason: "query matched nothing and is not a single child name",
			}),
	}

	Ok(())
}

fn element_json(element: &Element) -> Value {
	let attributes = element
		.attributes
		.iter()
		.map(|(k, v)| (k.clone(), Value::String(v.clone())))
		.collect::<serde_json::Map<_, _>>();
	let children = element
		.children
		.iter()
		.map(|child| match child {
			MarkupNode::Element(element) => element_json(element),
			MarkupNode::Text(text) => Value::String(text.clone()),
		})
		.collect::<Vec<_>>();

	serde_json::json!({ "name": element.name, "attributes": attributes, "children": children })
}
