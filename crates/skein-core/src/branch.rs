use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

use crate::item::{Group, Item};
use crate::rule::{Action, Rule};
use crate::RcString;

/// A named, prioritized alternative production.
///
/// Identity is structural over `(name, rule, priority)`; `transfer` only
/// marks whether a reflexive network should feed this branch's outputs
/// back into itself.
#[derive(Clone, Debug)]
pub struct Branch {
    pub name: RcString,
    pub rule: Rule,
    pub priority: i32,
    pub transfer: bool,
}

impl Branch {
    pub fn new(name: &str, rule: Rule, priority: i32) -> Branch {
        Branch {
            name: name.into(),
            rule,
            priority,
            transfer: false,
        }
    }
    pub fn transfer(mut self) -> Branch {
        self.transfer = true;
        self
    }
    /// The same branch holding the rule that remains after a split.
    pub fn with_rule(&self, rule: Rule) -> Branch {
        Branch {
            name: self.name.clone(),
            rule,
            priority: self.priority,
            transfer: self.transfer,
        }
    }

    /// Split the branch's rule, additionally offering to terminate validly
    /// without consuming when the rule can legally match zero items.
    pub fn split(&self) -> Vec<BranchCase> {
        let mut cases: Vec<BranchCase> = self
            .rule
            .split()
            .into_iter()
            .map(|case| BranchCase {
                group: case.group,
                action: case.action,
                branch: self.with_rule(case.remainder),
            })
            .collect();

        if self.rule.is_skipable() && !self.rule.is_terminal() {
            cases.push(BranchCase {
                group: Group::all(),
                action: Action::Exclude,
                branch: self.with_rule(Rule::empty(true)),
            });
        }

        cases
    }

    fn key(&self) -> (&str, i32, &Rule) {
        (&self.name, self.priority, &self.rule)
    }
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Branch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One case of a branch split: what the next input must be, what consuming
/// it does, and the branch left afterwards.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BranchCase {
    pub group: Group,
    pub action: Action,
    pub branch: Branch,
}

/// An automaton state: the set of branches simultaneously in play from a
/// shared start cursor.
///
/// Branches are stored sorted and deduplicated so that two sets built from
/// the same branches in any order are equal and hash identically.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BranchSet {
    branches: Vec<Branch>,
}

impl BranchSet {
    pub fn new(branches: impl IntoIterator<Item = Branch>) -> BranchSet {
        let mut branches: Vec<Branch> = branches.into_iter().collect();
        branches.sort();
        branches.dedup();
        BranchSet { branches }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Branch> {
        self.branches.iter()
    }
    pub fn len(&self) -> usize {
        self.branches.len()
    }
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// A set is terminal when every member has reached a final outcome.
    pub fn is_terminal(&self) -> bool {
        self.branches.iter().all(|branch| branch.rule.is_terminal())
    }

    /// Resolve the set into outcome names.
    ///
    /// Valid branches win over error branches, higher priority wins within
    /// each class, and priority ties legally return several names at once.
    /// With no valid branch: empty when `throw_errors`, otherwise one
    /// synthetic `!`-prefixed name built from the sorted maximal-priority
    /// error names.
    pub fn terminal_code(&self, throw_errors: bool) -> Vec<RcString> {
        let valid: Vec<&Branch> = self
            .branches
            .iter()
            .filter(|branch| branch.rule.is_valid())
            .collect();
        if let Some(max) = valid.iter().map(|branch| branch.priority).max() {
            let mut names: Vec<RcString> = valid
                .iter()
                .filter(|branch| branch.priority == max)
                .map(|branch| branch.name.clone())
                .collect();
            names.dedup();
            return names;
        }

        if throw_errors {
            return Vec::new();
        }

        let errors: Vec<&Branch> = self
            .branches
            .iter()
            .filter(|branch| branch.rule.is_error())
            .collect();
        let max = errors.iter().map(|branch| branch.priority).max();
        let names: BTreeSet<&str> = errors
            .iter()
            .filter(|branch| Some(branch.priority) == max)
            .map(|branch| &*branch.name)
            .collect();

        let mut code = String::from("!");
        for (i, name) in names.iter().enumerate() {
            if i != 0 {
                code.push('+');
            }
            code.push_str(name);
        }
        vec![code.into()]
    }

    /// Flatten [`Branch::split`] over every member.
    pub fn get_all_cases(&self) -> Vec<BranchCase> {
        self.branches
            .iter()
            .flat_map(|branch| branch.split())
            .collect()
    }

    /// Every explicitly enumerated item of every member rule.
    pub fn collect_items(&self, out: &mut BTreeSet<Item>) {
        for branch in &self.branches {
            branch.rule.collect_items(out);
        }
    }

    pub fn display_into(&self, buf: &mut dyn Write) -> fmt::Result {
        for branch in &self.branches {
            write!(buf, "{} ({}): ", branch.name, branch.priority)?;
            branch.rule.display_into(buf)?;
            writeln!(buf)?;
        }
        Ok(())
    }
}
