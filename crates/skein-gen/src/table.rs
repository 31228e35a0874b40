use std::collections::HashSet;
use std::fmt::{self, Display, Write};

use cranelift_entity::{entity_impl, PrimaryMap};
use skein_core::{Action, Group, Item, RcString};
use skein_runtime::{Transitions, Value};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StateHandle(u32);

entity_impl! { StateHandle }

/// One dispatch row. Case groups are disjoint by construction, so they
/// can be probed in order; an item contained in none of them takes the
/// default outcome.
#[derive(Clone, Debug, Default)]
pub struct StateRow {
    pub cases: Vec<(Group, Vec<(Action, Value)>)>,
    pub default: Vec<(Action, Value)>,
}

impl StateRow {
    pub fn lookup(&self, item: &Item) -> &[(Action, Value)] {
        for (group, outcome) in &self.cases {
            if group.contains(item) {
                return outcome;
            }
        }
        &self.default
    }
}

/// A built automaton. State 0 is the entry state a fresh cursor starts in.
pub struct Table {
    states: PrimaryMap<StateHandle, StateRow>,
    transfer: HashSet<RcString>,
}

impl Table {
    pub(crate) fn new(states: PrimaryMap<StateHandle, StateRow>, transfer: HashSet<RcString>) -> Table {
        Table { states, transfer }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
    pub fn row(&self, handle: StateHandle) -> &StateRow {
        &self.states[handle]
    }

    /// The names of branches marked `transfer`, to be fed back when the
    /// table drives a reflexive network.
    pub fn transfer_names(&self) -> impl Iterator<Item = RcString> + '_ {
        self.transfer.iter().cloned()
    }

    pub fn display_into(&self, buf: &mut dyn Write) -> fmt::Result {
        for (handle, row) in &self.states {
            writeln!(buf, "state {}:", handle.as_u32())?;
            for (group, outcome) in &row.cases {
                write!(buf, "  ")?;
                group.display_into(buf)?;
                write!(buf, " ->")?;
                display_outcome(buf, outcome)?;
                writeln!(buf)?;
            }
            write!(buf, "  _ ->")?;
            display_outcome(buf, &row.default)?;
            writeln!(buf)?;
        }
        Ok(())
    }
}

fn display_outcome(buf: &mut dyn Write, outcome: &[(Action, Value)]) -> fmt::Result {
    if outcome.is_empty() {
        return write!(buf, " <none>");
    }
    for (action, value) in outcome {
        write!(buf, " {action}:{value}")?;
    }
    Ok(())
}

impl Transitions for Table {
    fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)] {
        self.states[StateHandle::from_u32(state)].lookup(item)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_into(f)
    }
}
