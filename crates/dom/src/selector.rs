use std::str::FromStr;

use crate::DomError;

/// Parsed selector list.
///
/// Supported grammar: comma separated complex selectors, each a whitespace separated chain of
/// compounds (`tag`, `*`, `#id`, `.class`, `[attr]`, `[attr=value]`, `[attr="value"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
	alternatives: Vec<Vec<Compound>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
	tag: Option<String>,
	id: Option<String>,
	classes: Vec<String>,
	attributes: Vec<(String, Option<String>)>,
}

/// What the matcher needs to know about a node.
pub(crate) trait SelectorSubject {
	fn tag(&self) -> &str;
	fn attribute(&self, name: &str) -> Option<&str>;
}

impl Compound {
	fn matches(&self, node: &dyn SelectorSubject) -> bool {
		if let Some(tag) = &self.tag
			&& !tag.eq_ignore_ascii_case(node.tag())
		{
			return false;
		}
		if let Some(id) = &self.id
			&& node.attribute("id") != Some(id.as_str())
		{
			return false;
		}
		if !self.classes.is_empty() {
			let classes = node.attribute("class").unwrap_or_default();
			if !self.classes.iter().all(|c| classes.split_whitespace().any(|have| have == c)) {
				return false;
			}
		}
		self.attributes.iter().all(|(name, expected)| match (node.attribute(name), expected) {
			(None, _) => false,
			(Some(_), None) => true,
			(Some(actual), Some(expected)) => actual == expected,
		})
	}
}

impl Selector {
	/// Tests `chain[0]` (the node itself) and then ancestors for the rest of the selector.
	///
	/// `chain` lists the node followed by its ancestors, nearest first.
	pub(crate) fn matches(&self, chain: &[&dyn SelectorSubject]) -> bool {
		self.alternatives.iter().any(|compounds| matches_chain(compounds, chain))
	}
}

fn matches_chain(compounds: &[Compound], chain: &[&dyn SelectorSubject]) -> bool {
	let Some((last, rest)) = compounds.split_last() else {
		return false;
	};
	let Some((node, ancestors)) = chain.split_first() else {
		return false;
	};
	if !last.matches(*node) {
		return false;
	}

	let mut remaining = rest;
	for ancestor in ancestors {
		let Some((wanted, before)) = remaining.split_last() else {
			break;
		};
		if wanted.matches(*ancestor) {
			remaining = before;
		}
	}
	remaining.is_empty()
}

fn is_ident(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

struct Parser<'a> {
	source: &'a str,
	chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
	fn error(&self, reason: impl Into<String>) -> DomError {
		DomError::InvalidSelector {
			selector: self.source.to_string(),
			reason: reason.into(),
		}
	}

	fn ident(&mut self) -> Result<String, DomError> {
		let mut out = String::new();
		while let Some(&(_, c)) = self.chars.peek() {
			if !is_ident(c) {
				break;
			}
			out.push(c);
			self.chars.next();
		}
		if out.is_empty() {
			return Err(self.error("expected identifier"));
		}
		Ok(out)
	}

	fn attribute(&mut self) -> Result<(String, Option<String>), DomError> {
		let name = self.ident()?;
		match self.chars.next() {
			Some((_, ']')) => Ok((name, None)),
			Some((_, '=')) => {
				let value = match self.chars.peek() {
					Some(&(_, quote @ ('"' | '\''))) => {
						self.chars.next();
						let mut value = String::new();
						loop {
							match self.chars.next() {
								Some((_, c)) if c == quote => break,
								Some((_, c)) => value.push(c),
								None => return Err(self.error("unterminated string")),
							}
						}
						value
					}
					_ => self.ident()?,
				};
				match self.chars.next() {
					Some((_, ']')) => Ok((name, Some(value))),
					_ => Err(self.error("expected `]`")),
				}
			}
			_ => Err(self.error("expected `]` or `=`")),
		}
	}

	fn compound(&mut self) -> Result<Compound, DomError> {
		let mut compound = Compound::default();
		let mut empty = true;
		while let Some(&(_, c)) = self.chars.peek() {
			match c {
				'*' => {
					self.chars.next();
				}
				'#' => {
					self.chars.next();
					compound.id = Some(self.ident()?);
				}
				'.' => {
					self.chars.next();
					compound.classes.push(self.ident()?);
				}
				'[' => {
					self.chars.next();
					compound.attributes.push(self.attribute()?);
				}
				c if is_ident(c) && empty => compound.tag = Some(self.ident()?),
				_ => break,
			}
			empty = false;
		}
		if empty {
			return Err(self.error("expected selector"));
		}
		Ok(compound)
	}

	fn skip_whitespace(&mut self) -> bool {
		let mut skipped = false;
		while let Some(&(_, c)) = self.chars.peek() {
			if !c.is_whitespace() {
				break;
			}
			self.chars.next();
			skipped = true;
		}
		skipped
	}

	fn parse(mut self) -> Result<Selector, DomError> {
		let mut alternatives = Vec::new();
		let mut current = Vec::new();
		self.skip_whitespace();
		loop {
			current.push(self.compound()?);
			self.skip_whitespace();
			match self.chars.peek() {
				None => break,
				Some(&(_, ',')) => {
					self.chars.next();
					self.skip_whitespace();
					alternatives.push(std::mem::take(&mut current));
				}
				Some(_) => {}
			}
		}
		alternatives.push(current);
		Ok(Selector { alternatives })
	}
}

impl FromStr for Selector {
	type Err = DomError;

	fn from_str(source: &str) -> Result<Self, Self::Err> {
		Parser {
			source,
			chars: source.char_indices().peekable(),
		}
		.parse()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	struct Fake {
		tag: &'static str,
		attrs: HashMap<&'static str, &'static str>,
	}

	impl SelectorSubject for Fake {
		fn tag(&self) -> &str {
			self.tag
		}

		fn attribute(&self, name: &str) -> Option<&str> {
			self.attrs.get(name).copied()
		}
	}

	fn fake(tag: &'static str, attrs: &[(&'static str, &'static str)]) -> Fake {
		Fake {
			tag,
			attrs: attrs.iter().copied().collect(),
		}
	}

	#[test]
	fn matches_compound_attributes() {
		let selector: Selector = r#"cke5-editable[data-cke-editor-id="e1"][data-cke-root-name]"#.parse().unwrap();
		let node = fake("cke5-editable", &[("data-cke-editor-id", "e1"), ("data-cke-root-name", "foo")]);
		let other = fake("cke5-editable", &[("data-cke-editor-id", "e2"), ("data-cke-root-name", "foo")]);
		assert!(selector.matches(&[&node]));
		assert!(!selector.matches(&[&other]));
	}

	#[test]
	fn matches_id_class_and_descendant() {
		let selector: Selector = "#form .toolbar".parse().unwrap();
		let node = fake("div", &[("class", "ck toolbar")]);
		let middle = fake("section", &[]);
		let form = fake("form", &[("id", "form")]);
		assert!(selector.matches(&[&node, &middle, &form]));
		assert!(!selector.matches(&[&node, &middle]));
	}

	#[test]
	fn selector_lists() {
		let selector: Selector = "input, [data-cke-editable-content]".parse().unwrap();
		assert!(selector.matches(&[&fake("input", &[])]));
		assert!(selector.matches(&[&fake("div", &[("data-cke-editable-content", "")])]));
		assert!(!selector.matches(&[&fake("div", &[])]));
	}

	#[test]
	fn rejects_garbage() {
		assert!("[unterminated".parse::<Selector>().is_err());
		assert!("".parse::<Selector>().is_err());
		assert!("a > b".parse::<Selector>().is_err());
	}
}
