//! Path template resolution for `{name}` and optional `{name?}` placeholders.

// self
use crate::{_prelude::*, error::ValidationError};

/// Caller-supplied placeholder values.
pub type Params = BTreeMap<String, String>;

/// Resolves every placeholder in `template` from `params`.
///
/// Required placeholders without a value fail with [`ValidationError::MissingParameter`].
/// Optional placeholders (`{name?}`) without a value are dropped together with the one separator
/// they leave behind; every other slash is kept. Values are percent-encoded as path segments.
pub fn resolve(template: &str, params: &Params) -> Result<String, ValidationError> {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;

	while let Some(open) = rest.find('{') {
		let Some(len) = rest[open..].find('}') else {
			break;
		};
		let raw = &rest[open + 1..open + len];
		let (name, optional) = match raw.strip_suffix('?') {
			Some(name) => (name, true),
			None => (raw, false),
		};

		out.push_str(&rest[..open]);

		let tail = &rest[open + len + 1..];

		match lookup(params, name) {
			Some(value) => out.push_str(&encode_segment(value)),
			None if optional =>
				if out.ends_with('/')
					&& (tail.is_empty() || tail.starts_with('/'))
					&& (out.len() > 1 || !tail.is_empty())
				{
					out.pop();
				},
			None =>
				return Err(ValidationError::MissingParameter {
					name: name.to_owned(),
					template: template.to_owned(),
				}),
		}

		rest = tail;
	}

	out.push_str(rest);

	Ok(out)
}

fn lookup<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
	params.get(name).or_else(|| params.get(&snake_case(name))).map(String::as_str)
}

fn snake_case(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 4);

	for (idx, ch) in name.chars().enumerate() {
		if ch.is_ascii_uppercase() {
			if idx > 0 {
				out.push('_');
			}

			out.push(ch.to_ascii_lowercase());
		} else {
			out.push(ch);
		}
	}

	out
}

fn encode_segment(value: &str) -> String {
	url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>().replace('+', "%20")
}
