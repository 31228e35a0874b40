use std::fmt::{self, Display, Write};

use crate::item::{Group, Item};
use crate::RcString;

/// What consuming an item does to the element under construction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Action {
    /// Consume the matched item and continue.
    Include,
    /// Reject without consuming. Always leads to a terminal remainder.
    Exclude,
    /// Attach the consumed child under a single-valued name.
    CollectAs(RcString),
    /// Append the consumed child to a list-valued name.
    CollectIn(RcString),
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Include => write!(f, "include"),
            Action::Exclude => write!(f, "exclude"),
            Action::CollectAs(name) => write!(f, "collect-as:{name}"),
            Action::CollectIn(name) => write!(f, "collect-in:{name}"),
        }
    }
}

/// A regular-expression-like production rule.
///
/// Rules are immutable values; advancing a rule by one input symbol goes
/// through [`Rule::split`], which returns what can be matched next and
/// what remains afterwards.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Rule {
    /// An unconditional terminal accept (`valid`) or reject.
    Empty { valid: bool },
    /// Consume one item iff it is in `group`.
    Match { group: Group, action: Action },
    Optional(Box<Rule>),
    Repeat(Box<Rule>),
    /// Sequence. Never contains `Empty` members when built through
    /// [`Rule::all`] or [`Rule::and_then`].
    All(Vec<Rule>),
    /// Ordered alternation.
    Any(Vec<Rule>),
}

/// One outcome of splitting a rule: `group`/`action` describe the
/// hypothetical next input, `remainder` is the rule left after it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SplitCase {
    pub group: Group,
    pub action: Action,
    pub remainder: Rule,
}

impl Rule {
    pub fn empty(valid: bool) -> Rule {
        Rule::Empty { valid }
    }
    pub fn matching(group: Group, action: Action) -> Rule {
        Rule::Match { group, action }
    }
    pub fn optional(rule: Rule) -> Rule {
        Rule::Optional(Box::new(rule))
    }
    pub fn repeat(rule: Rule) -> Rule {
        Rule::Repeat(Box::new(rule))
    }
    /// Sequence constructor. Flattens nested sequences, drops `Empty(true)`
    /// units and short-circuits on `Empty(false)`; zero members behave as
    /// `Empty(true)`.
    pub fn all(rules: impl IntoIterator<Item = Rule>) -> Rule {
        let mut out = Vec::new();
        for rule in rules {
            match rule {
                Rule::Empty { valid: true } => {}
                err @ Rule::Empty { valid: false } => return err,
                Rule::All(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Rule::empty(true),
            1 => out.pop().unwrap(),
            _ => Rule::All(out),
        }
    }
    /// Alternation constructor. Flattens nested alternations; zero members
    /// can never match and behave as `Empty(false)`.
    pub fn any(rules: impl IntoIterator<Item = Rule>) -> Rule {
        let mut out = Vec::new();
        for rule in rules {
            match rule {
                Rule::Any(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Rule::empty(false),
            1 => out.pop().unwrap(),
            _ => Rule::Any(out),
        }
    }

    /// Sequence `self` before `next`, normalizing as [`Rule::all`] does.
    pub fn and_then(self, next: Rule) -> Rule {
        match self {
            Rule::Empty { valid: true } => next,
            err @ Rule::Empty { valid: false } => err,
            first => match next {
                Rule::Empty { valid: true } => first,
                Rule::All(rest) => match first {
                    Rule::All(mut members) => {
                        members.extend(rest);
                        Rule::All(members)
                    }
                    first => {
                        let mut members = rest;
                        members.insert(0, first);
                        Rule::All(members)
                    }
                },
                next => match first {
                    Rule::All(mut members) => {
                        members.push(next);
                        Rule::All(members)
                    }
                    first => Rule::All(vec![first, next]),
                },
            },
        }
    }

    /// Whether this rule is a final outcome, unable to consume more input.
    pub fn is_terminal(&self) -> bool {
        match self {
            Rule::Empty { .. } => true,
            Rule::Match { .. } => false,
            Rule::Optional(rule) | Rule::Repeat(rule) => rule.is_terminal(),
            Rule::All(rules) => match rules.as_slice() {
                [] => true,
                [rule] => rule.is_terminal(),
                _ => false,
            },
            Rule::Any(rules) => rules.iter().all(|rule| rule.is_terminal()),
        }
    }

    /// Whether this rule currently resolves to an accept.
    pub fn is_valid(&self) -> bool {
        match self {
            Rule::Empty { valid } => *valid,
            Rule::Match { .. } => false,
            Rule::Optional(rule) | Rule::Repeat(rule) => rule.is_valid(),
            Rule::All(rules) => rules.iter().all(|rule| rule.is_valid()),
            Rule::Any(rules) => rules.iter().any(|rule| rule.is_valid()),
        }
    }

    /// Whether this rule currently resolves to a reject.
    pub fn is_error(&self) -> bool {
        match self {
            Rule::Empty { valid } => !valid,
            Rule::Match { .. } => false,
            Rule::Optional(rule) | Rule::Repeat(rule) => rule.is_error(),
            Rule::All(rules) => rules.iter().any(|rule| rule.is_error()),
            Rule::Any(rules) => !rules.is_empty() && rules.iter().all(|rule| rule.is_error()),
        }
    }

    /// Whether this rule can legally consume zero items.
    pub fn is_skipable(&self) -> bool {
        match self {
            Rule::Empty { valid } => *valid,
            Rule::Match { .. } => false,
            Rule::Optional(_) | Rule::Repeat(_) => true,
            Rule::All(rules) => rules.iter().all(|rule| rule.is_skipable()),
            Rule::Any(rules) => rules.iter().any(|rule| rule.is_skipable()),
        }
    }

    /// Collect every explicitly enumerated item into `out`.
    ///
    /// The union over all branches of a grammar, plus `AnyOther`, is the
    /// alphabet the table builder partitions.
    pub fn collect_items(&self, out: &mut std::collections::BTreeSet<Item>) {
        let mut work = vec![self];
        while let Some(rule) = work.pop() {
            match rule {
                Rule::Empty { .. } => {}
                Rule::Match { group, .. } => out.extend(group.iter_items().cloned()),
                Rule::Optional(rule) | Rule::Repeat(rule) => work.push(rule),
                Rule::All(rules) | Rule::Any(rules) => work.extend(rules.iter()),
            }
        }
    }

    /// The symbolic derivative: for every possible next input symbol, what
    /// is matched and what rule remains.
    ///
    /// Driven by an explicit work list so deeply nested rules cannot
    /// overflow the stack. Each work entry carries the rule still to be
    /// decomposed and the suffix that must be sequenced after any of its
    /// remainders.
    pub fn split(&self) -> Vec<SplitCase> {
        let mut out = Vec::new();
        let mut work: Vec<(Rule, Rule)> = vec![(self.clone(), Rule::empty(true))];

        while let Some((rule, suffix)) = work.pop() {
            match rule {
                Rule::Empty { valid } => {
                    // an empty rule never consumes and is already resolved
                    let group = if valid { Group::all() } else { Group::none() };
                    out.push(SplitCase {
                        group,
                        action: Action::Exclude,
                        remainder: Rule::Empty { valid }.and_then(suffix),
                    });
                }
                Rule::Match { group, action } => {
                    out.push(SplitCase {
                        group: group.complement(),
                        action: Action::Exclude,
                        remainder: Rule::empty(false),
                    });
                    out.push(SplitCase {
                        group,
                        action,
                        remainder: suffix,
                    });
                }
                Rule::Optional(inner) => work.push((*inner, suffix)),
                Rule::Repeat(inner) => {
                    // a successful consumption loops back into the repeat
                    let looped = Rule::Repeat(inner.clone()).and_then(suffix);
                    work.push((*inner, looped));
                }
                Rule::All(members) => {
                    if members.is_empty() {
                        work.push((Rule::empty(true), suffix));
                        continue;
                    }
                    // decompose member by member, stopping at the first
                    // member that cannot be skipped
                    let mut chain = Vec::new();
                    for (i, member) in members.iter().enumerate() {
                        let rest =
                            Rule::all(members[i + 1..].iter().cloned()).and_then(suffix.clone());
                        let skipable = member.is_skipable();
                        chain.push((member.clone(), rest));
                        if !skipable {
                            break;
                        }
                    }
                    work.extend(chain.into_iter().rev());
                }
                Rule::Any(members) => {
                    work.extend(
                        members
                            .into_iter()
                            .rev()
                            .map(|member| (member, suffix.clone())),
                    );
                }
            }
        }

        out
    }

    pub fn display_into(&self, buf: &mut dyn Write) -> fmt::Result {
        match self {
            Rule::Empty { valid: true } => write!(buf, "ok"),
            Rule::Empty { valid: false } => write!(buf, "err"),
            Rule::Match { group, action } => {
                group.display_into(buf)?;
                write!(buf, ":{action}")
            }
            Rule::Optional(rule) => {
                write!(buf, "(")?;
                rule.display_into(buf)?;
                write!(buf, ")?")
            }
            Rule::Repeat(rule) => {
                write!(buf, "(")?;
                rule.display_into(buf)?;
                write!(buf, ")*")
            }
            Rule::All(rules) => display_joined(buf, rules, " "),
            Rule::Any(rules) => display_joined(buf, rules, " | "),
        }
    }
}

fn display_joined(buf: &mut dyn Write, rules: &[Rule], separator: &str) -> fmt::Result {
    write!(buf, "(")?;
    for (i, rule) in rules.iter().enumerate() {
        if i != 0 {
            write!(buf, "{separator}")?;
        }
        rule.display_into(buf)?;
    }
    write!(buf, ")")
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_into(f)
    }
}
