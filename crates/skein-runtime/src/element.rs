use std::collections::BTreeMap;
use std::fmt::{self, Display};

use skein_core::{Action, Item, RcString};

/// The state an element currently holds: a non-terminal automaton state
/// id (0 for a fresh cursor) or a terminal outcome name. Error outcomes
/// are prefixed with `!`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    State(u32),
    Name(RcString),
}

impl Value {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Value::Name(_))
    }
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Name(name) if name.starts_with('!'))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::State(state) => write!(f, "#{state}"),
            Value::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A child collected under a name, single-valued or list-valued.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Collected {
    One(Box<Element>),
    Many(Vec<Element>),
}

/// Accumulated payload: source text for a token layer, named children for
/// a parse layer.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Content {
    Text(String),
    Tree(BTreeMap<RcString, Collected>),
}

/// Which payload flavor a network's fresh cursors start with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContentMode {
    Text,
    Tree,
}

/// A positioned runtime node.
///
/// Created empty at a start offset with state 0, repeatedly developed into
/// new elements as input is consumed, immutable once yielded as a terminal
/// result.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Element {
    pub start: u32,
    pub end: u32,
    pub value: Value,
    pub content: Content,
    /// Explicit alphabet symbol for raw inputs; produced terminal elements
    /// present their name as a tag instead.
    symbol: Option<Item>,
}

impl Element {
    /// A fresh non-terminal cursor at `at`.
    pub fn open(at: u32, mode: ContentMode) -> Element {
        Element {
            start: at,
            end: at,
            value: Value::State(0),
            content: match mode {
                ContentMode::Text => Content::Text(String::new()),
                ContentMode::Tree => Content::Tree(BTreeMap::new()),
            },
            symbol: None,
        }
    }

    /// A terminal input element carrying one raw character.
    pub fn char_input(start: u32, c: char) -> Element {
        Element {
            start,
            end: start + c.len_utf8() as u32,
            value: Value::Name(c.to_string().into()),
            content: Content::Text(c.to_string()),
            symbol: Some(Item::Char(c)),
        }
    }

    /// Terminal input elements for every character of `src`, positioned by
    /// byte offset.
    pub fn chars(src: &str) -> impl Iterator<Item = Element> + '_ {
        src.char_indices()
            .map(|(offset, c)| Element::char_input(offset as u32, c))
    }

    /// The synthesized end-of-stream input. Its item is `AnyOther`, so it
    /// can only take default transitions.
    pub fn eof(at: u32) -> Element {
        Element {
            start: at,
            end: at,
            value: Value::Name("<eof>".into()),
            content: Content::Text(String::new()),
            symbol: Some(Item::AnyOther),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.value.is_terminal()
    }
    pub fn is_error(&self) -> bool {
        self.value.is_error()
    }
    pub fn name(&self) -> Option<&RcString> {
        match &self.value {
            Value::Name(name) => Some(name),
            Value::State(_) => None,
        }
    }
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            Content::Tree(_) => None,
        }
    }
    pub fn child(&self, name: &str) -> Option<&Collected> {
        match &self.content {
            Content::Tree(children) => children.get(name),
            Content::Text(_) => None,
        }
    }

    /// The alphabet symbol this element presents to a consuming network.
    pub fn item(&self) -> Item {
        if let Some(item) = &self.symbol {
            return item.clone();
        }
        match &self.value {
            Value::Name(name) => Item::Tag(name.clone()),
            Value::State(_) => Item::AnyOther,
        }
    }

    /// Produce the element that results from taking one transition.
    ///
    /// `Exclude` leaves position and payload untouched (the input is not
    /// consumed); every other action consumes `input` and extends the span
    /// to its end.
    pub fn develop(&self, action: &Action, value: Value, input: &Element) -> Element {
        let mut next = self.clone();
        next.value = value;
        next.symbol = None;

        match action {
            Action::Exclude => {}
            Action::Include => {
                next.end = input.end;
                if let (Content::Text(text), Some(consumed)) = (&mut next.content, input.text()) {
                    text.push_str(consumed);
                }
            }
            Action::CollectAs(key) => {
                next.end = input.end;
                match &mut next.content {
                    Content::Tree(children) => {
                        children.insert(key.clone(), Collected::One(Box::new(input.clone())));
                    }
                    Content::Text(text) => {
                        if let Some(consumed) = input.text() {
                            text.push_str(consumed);
                        }
                    }
                }
            }
            Action::CollectIn(key) => {
                next.end = input.end;
                match &mut next.content {
                    Content::Tree(children) => {
                        let slot = children
                            .entry(key.clone())
                            .or_insert_with(|| Collected::Many(Vec::new()));
                        match slot {
                            Collected::Many(list) => list.push(input.clone()),
                            Collected::One(_) => {
                                // collect-in over a single-valued slot widens it
                                let Collected::One(first) =
                                    std::mem::replace(slot, Collected::Many(Vec::new()))
                                else {
                                    unreachable!()
                                };
                                let Collected::Many(list) = slot else { unreachable!() };
                                list.push(*first);
                                list.push(input.clone());
                            }
                        }
                    }
                    Content::Text(text) => {
                        if let Some(consumed) = input.text() {
                            text.push_str(consumed);
                        }
                    }
                }
            }
        }

        next
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} {}", self.start, self.end, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_inputs_use_byte_offsets() {
        let elements: Vec<Element> = Element::chars("aé b").collect();
        assert_eq!(elements.len(), 4);
        assert_eq!((elements[0].start, elements[0].end), (0, 1));
        assert_eq!((elements[1].start, elements[1].end), (1, 3));
        assert_eq!((elements[2].start, elements[2].end), (3, 4));
        assert_eq!(elements[1].item(), Item::Char('é'));
        assert!(elements[0].is_terminal());
    }

    #[test]
    fn include_accumulates_text() {
        let cursor = Element::open(0, ContentMode::Text);
        let a = Element::char_input(0, 'a');
        let b = Element::char_input(1, 'b');

        let step = cursor.develop(&Action::Include, Value::State(1), &a);
        assert_eq!((step.start, step.end), (0, 1));
        assert_eq!(step.text(), Some("a"));

        let done = step.develop(&Action::Include, Value::Name("AB".into()), &b);
        assert_eq!((done.start, done.end), (0, 2));
        assert_eq!(done.text(), Some("ab"));
        assert_eq!(done.item(), Item::tag("AB"));
    }

    #[test]
    fn exclude_consumes_nothing() {
        let cursor = Element::open(0, ContentMode::Text);
        let a = Element::char_input(0, 'a');
        let step = cursor.develop(&Action::Include, Value::State(1), &a);
        let done = step.develop(&Action::Exclude, Value::Name("A".into()), &Element::char_input(1, 'x'));
        assert_eq!((done.start, done.end), (0, 1));
        assert_eq!(done.text(), Some("a"));
    }

    #[test]
    fn collect_builds_children() {
        let cursor = Element::open(0, ContentMode::Tree);
        let token = Element::open(0, ContentMode::Text)
            .develop(&Action::Include, Value::Name("N".into()), &Element::char_input(0, '1'));

        let one = cursor.develop(&Action::CollectAs("head".into()), Value::State(1), &token);
        assert!(matches!(one.child("head"), Some(Collected::One(_))));

        let many = one
            .develop(&Action::CollectIn("rest".into()), Value::State(1), &token)
            .develop(&Action::CollectIn("rest".into()), Value::State(1), &token);
        match many.child("rest") {
            Some(Collected::Many(list)) => assert_eq!(list.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn error_names_are_detected() {
        let mut element = Element::open(0, ContentMode::Text);
        element.value = Value::Name("!INT".into());
        assert!(element.is_error());
    }
}
