use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use cranelift_entity::{EntitySet, PrimaryMap};
use log::{debug, trace};
use skein_core::{Action, Branch, BranchCase, BranchSet, Group, Item, RcString};
use skein_runtime::Value;

use crate::table::{StateHandle, StateRow, Table};

/// Breadth-first exploration of the branch-set state space.
///
/// Every reachable non-terminal BranchSet becomes one table row. Items
/// that behave identically in a row (accepted by the same set of cases)
/// are merged into one compressed group; items indistinguishable from
/// `AnyOther` fold into the row's default outcome.
pub struct Builder {
    throw_errors: bool,
}

/// Build a table with the default settings.
pub fn build(branches: impl IntoIterator<Item = Branch>) -> Table {
    Builder::new().build(branches)
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            throw_errors: false,
        }
    }

    /// Omit error outcomes from rows instead of synthesizing `!` names.
    pub fn throw_errors(mut self) -> Builder {
        self.throw_errors = true;
        self
    }

    pub fn build(&self, branches: impl IntoIterator<Item = Branch>) -> Table {
        let branches: Vec<Branch> = branches.into_iter().collect();
        let transfer: HashSet<RcString> = branches
            .iter()
            .filter(|branch| branch.transfer)
            .map(|branch| branch.name.clone())
            .collect();

        let mut states: PrimaryMap<StateHandle, StateRow> = PrimaryMap::new();
        let mut interned: HashMap<BranchSet, StateHandle> = HashMap::new();
        let mut queue: VecDeque<BranchSet> = VecDeque::new();

        // the entry set gets state 0, the id fresh cursors start in
        let entry = BranchSet::new(branches);
        let handle = states.push(StateRow::default());
        interned.insert(entry.clone(), handle);
        queue.push_back(entry);

        let mut filled = EntitySet::new();
        while let Some(set) = queue.pop_front() {
            let handle = interned[&set];
            let row = self.build_row(&set, &mut states, &mut interned, &mut queue);
            trace!(
                "state {}: {} branches, {} cases",
                handle.as_u32(),
                set.len(),
                row.cases.len()
            );
            states[handle] = row;
            filled.insert(handle);
        }
        debug_assert!(states.keys().all(|handle| filled.contains(handle)));
        debug!("built {} states", states.len());

        Table::new(states, transfer)
    }

    fn build_row(
        &self,
        set: &BranchSet,
        states: &mut PrimaryMap<StateHandle, StateRow>,
        interned: &mut HashMap<BranchSet, StateHandle>,
        queue: &mut VecDeque<BranchSet>,
    ) -> StateRow {
        let cases = set.get_all_cases();

        let mut alphabet = BTreeSet::new();
        set.collect_items(&mut alphabet);

        // the sign of an item is the set of cases accepting it; items with
        // equal signs are interchangeable in this row
        let sign = |item: &Item| -> Vec<u32> {
            cases
                .iter()
                .enumerate()
                .filter(|(_, case)| case.group.contains(item))
                .map(|(i, _)| i as u32)
                .collect()
        };

        let default_sign = sign(&Item::AnyOther);
        let mut classes: BTreeMap<Vec<u32>, Vec<Item>> = BTreeMap::new();
        for item in &alphabet {
            let s = sign(item);
            if s != default_sign {
                classes.entry(s).or_default().push(item.clone());
            }
        }

        let mut row = StateRow::default();
        for (sign, items) in classes {
            let outcome = self.resolve(&sign, &cases, states, interned, queue);
            row.cases.push((Group::new(items), outcome));
        }
        row.default = self.resolve(&default_sign, &cases, states, interned, queue);
        row
    }

    /// Turn the cases accepting one item class into an ordered outcome
    /// list: accepting cases are bucketed by action, and each bucket's
    /// remainder branches form the successor set. Fully terminal successor
    /// sets resolve to names, the rest become (possibly new) states.
    fn resolve(
        &self,
        sign: &[u32],
        cases: &[BranchCase],
        states: &mut PrimaryMap<StateHandle, StateRow>,
        interned: &mut HashMap<BranchSet, StateHandle>,
        queue: &mut VecDeque<BranchSet>,
    ) -> Vec<(Action, Value)> {
        let mut buckets: Vec<(Action, Vec<Branch>)> = Vec::new();
        for &index in sign {
            let case = &cases[index as usize];
            match buckets.iter_mut().find(|(action, _)| *action == case.action) {
                Some((_, members)) => members.push(case.branch.clone()),
                None => buckets.push((case.action.clone(), vec![case.branch.clone()])),
            }
        }

        let mut outcome = Vec::new();
        for (action, members) in buckets {
            let successor = BranchSet::new(members);
            if successor.is_terminal() {
                for name in successor.terminal_code(self.throw_errors) {
                    outcome.push((action.clone(), Value::Name(name)));
                }
            } else {
                let handle = match interned.get(&successor) {
                    Some(&handle) => handle,
                    None => {
                        let handle = states.push(StateRow::default());
                        interned.insert(successor.clone(), handle);
                        queue.push_back(successor);
                        handle
                    }
                };
                outcome.push((action, Value::State(handle.as_u32())));
            }
        }
        outcome
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}
