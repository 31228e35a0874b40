use std::collections::BTreeSet;
use std::fmt::{self, Display, Write};

use crate::RcString;

/// An atomic alphabet symbol.
///
/// A character-level layer matches on `Char`, a layer consuming the
/// previous layer's output matches on `Tag`. `AnyOther` stands for every
/// symbol not enumerated anywhere in the grammar; it exists so that
/// inverted groups have a concrete witness during table construction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Item {
    Char(char),
    Tag(RcString),
    AnyOther,
}

impl Item {
    pub fn tag(name: &str) -> Item {
        Item::Tag(name.into())
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Char(c) => write!(f, "{:?}", c),
            Item::Tag(name) => write!(f, "{name}"),
            Item::AnyOther => write!(f, "<other>"),
        }
    }
}

/// An immutable set of items, or its complement over the open alphabet.
///
/// Membership is `inverted XOR (item in items)`. The empty non-inverted
/// group matches nothing, the empty inverted group matches everything.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Group {
    items: BTreeSet<Item>,
    inverted: bool,
}

impl Group {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Group {
        Group {
            items: items.into_iter().collect(),
            inverted: false,
        }
    }
    pub fn none() -> Group {
        Group {
            items: BTreeSet::new(),
            inverted: false,
        }
    }
    pub fn all() -> Group {
        Group {
            items: BTreeSet::new(),
            inverted: true,
        }
    }
    pub fn chars(chars: &str) -> Group {
        Group::new(chars.chars().map(Item::Char))
    }
    pub fn tags<'a>(names: impl IntoIterator<Item = &'a str>) -> Group {
        Group::new(names.into_iter().map(Item::tag))
    }
    pub fn single(item: Item) -> Group {
        Group::new([item])
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && !self.inverted
    }
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }
    pub fn contains(&self, item: &Item) -> bool {
        self.inverted ^ self.items.contains(item)
    }
    /// The enumerated items, without regard to inversion.
    pub fn iter_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn complement(&self) -> Group {
        Group {
            items: self.items.clone(),
            inverted: !self.inverted,
        }
    }
    pub fn union(&self, other: &Group) -> Group {
        match (self.inverted, other.inverted) {
            (false, false) => Group {
                items: self.items.union(&other.items).cloned().collect(),
                inverted: false,
            },
            (true, true) => Group {
                items: self.items.intersection(&other.items).cloned().collect(),
                inverted: true,
            },
            // ¬A ∪ B = ¬(A \ B)
            (true, false) => Group {
                items: self.items.difference(&other.items).cloned().collect(),
                inverted: true,
            },
            (false, true) => Group {
                items: other.items.difference(&self.items).cloned().collect(),
                inverted: true,
            },
        }
    }
    pub fn intersect(&self, other: &Group) -> Group {
        self.complement().union(&other.complement()).complement()
    }
    pub fn difference(&self, other: &Group) -> Group {
        self.intersect(&other.complement())
    }

    pub fn display_into(&self, buf: &mut dyn Write) -> fmt::Result {
        if self.inverted {
            write!(buf, "!")?;
        }
        write!(buf, "{{")?;
        let mut first = true;
        for item in &self.items {
            if !first {
                write!(buf, " ")?;
            }
            first = false;
            write!(buf, "{item}")?;
        }
        write!(buf, "}}")
    }
}

impl Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_into(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Group {
        Group::chars("abc")
    }

    #[test]
    fn membership() {
        let g = abc();
        assert!(g.contains(&Item::Char('a')));
        assert!(!g.contains(&Item::Char('z')));
        assert!(!g.contains(&Item::AnyOther));

        let n = g.complement();
        assert!(!n.contains(&Item::Char('a')));
        assert!(n.contains(&Item::Char('z')));
        assert!(n.contains(&Item::AnyOther));
    }

    #[test]
    fn empty_and_full() {
        assert!(!Group::none().contains(&Item::Char('x')));
        assert!(Group::all().contains(&Item::Char('x')));
        assert!(Group::all().contains(&Item::AnyOther));
    }

    #[test]
    fn set_algebra() {
        let ab = Group::chars("ab");
        let bc = Group::chars("bc");

        // exhaustive check over a small universe plus the open remainder
        let universe = [
            Item::Char('a'),
            Item::Char('b'),
            Item::Char('c'),
            Item::Char('d'),
            Item::AnyOther,
        ];
        for variant in 0..4 {
            let x = if variant & 1 != 0 { ab.complement() } else { ab.clone() };
            let y = if variant & 2 != 0 { bc.complement() } else { bc.clone() };

            let union = x.union(&y);
            let inter = x.intersect(&y);
            let diff = x.difference(&y);
            for item in &universe {
                assert_eq!(union.contains(item), x.contains(item) || y.contains(item));
                assert_eq!(inter.contains(item), x.contains(item) && y.contains(item));
                assert_eq!(diff.contains(item), x.contains(item) && !y.contains(item));
            }
        }
    }
}
