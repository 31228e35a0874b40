use std::collections::HashSet;
use std::fmt::{self, Display};

use log::{debug, trace};
use skein_core::{Action, Item, RcString};

use crate::element::{ContentMode, Element, Value};
use crate::position::{PositionRegister, SharedPositions};

/// The boundary between a built (or emitted) table and the runtime.
///
/// Must be pure: identical arguments yield identical results, in a stable
/// order. A memoizing wrapper is a legitimate implementation.
pub trait Transitions {
    fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)];
}

/// Overlap policy for one step's worth of terminal candidates: decides
/// which of `batch` survive next to the already `kept` elements and each
/// other. Candidates of one step are judged together, so a longer match
/// appearing later in the batch can still displace a shorter one.
pub type DedupFn = fn(&PositionRegister, &[Element], &[Element]) -> Vec<Element>;

/// The default policy: at a given canonical end, exact repeats (same value
/// over the same canonical span) are dropped, and a candidate loses to any
/// rival starting strictly earlier (maximal munch).
pub fn default_dedup(
    positions: &PositionRegister,
    kept: &[Element],
    batch: &[Element],
) -> Vec<Element> {
    let mut out = Vec::new();
    'next: for (i, candidate) in batch.iter().enumerate() {
        let start = positions.canonical(candidate.start);
        let end = positions.canonical(candidate.end);
        for rival in kept.iter().chain(&batch[..i]) {
            if positions.canonical(rival.end) != end {
                continue;
            }
            if rival.value == candidate.value && positions.canonical(rival.start) == start {
                continue 'next;
            }
            if positions.canonical(rival.start) < start {
                continue 'next;
            }
        }
        for rival in &batch[i + 1..] {
            if positions.canonical(rival.end) == end && positions.canonical(rival.start) < start {
                continue 'next;
            }
        }
        out.push(candidate.clone());
    }
    out
}

/// Keeps everything except exact repeats: same value over the same
/// canonical span. The usual choice for reflexive networks, where several
/// results of one name may legitimately end at the same position.
pub fn distinct_dedup(
    positions: &PositionRegister,
    kept: &[Element],
    batch: &[Element],
) -> Vec<Element> {
    let mut out = Vec::new();
    'next: for (i, candidate) in batch.iter().enumerate() {
        for rival in kept.iter().chain(&batch[..i]) {
            if rival.value == candidate.value
                && positions.same(rival.start, candidate.start)
                && positions.same(rival.end, candidate.end)
            {
                continue 'next;
            }
        }
        out.push(candidate.clone());
    }
    out
}

#[derive(Clone)]
pub struct NetworkConfig {
    /// Terminal names bridged over instead of emitted.
    pub skip: HashSet<RcString>,
    /// Payload flavor of fresh cursors.
    pub mode: ContentMode,
    /// Allow cursors to open at positions nothing ends at.
    pub allow_gaps: bool,
    pub dedup: DedupFn,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            skip: HashSet::new(),
            mode: ContentMode::Text,
            allow_gaps: false,
            dedup: default_dedup,
        }
    }
}

impl NetworkConfig {
    pub fn tree() -> NetworkConfig {
        NetworkConfig {
            mode: ContentMode::Tree,
            ..Default::default()
        }
    }
    pub fn skip(mut self, name: &str) -> NetworkConfig {
        self.skip.insert(name.into());
        self
    }
    pub fn allow_gaps(mut self) -> NetworkConfig {
        self.allow_gaps = true;
        self
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NetworkError {
    /// The reflexive fixed point exceeded its defensive iteration bound,
    /// which indicates an unbounded feedback cycle in the grammar.
    NonTermination { limit: usize },
}

impl Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::NonTermination { limit } => {
                write!(f, "reflexive fixed point did not settle within {limit} steps")
            }
        }
    }
}

impl std::error::Error for NetworkError {}

/// The incremental runtime: consumes a stream of terminal input elements
/// against a transition table, yielding terminal output elements.
///
/// Live non-terminal elements are advanced whenever an input starts where
/// they end; skipped results bridge positions instead of being emitted.
pub struct Network<'a> {
    table: &'a dyn Transitions,
    config: NetworkConfig,
    positions: SharedPositions,
    live: Vec<Element>,
    confirmed: Vec<Element>,
    origin: Option<u32>,
    last_start: Option<u32>,
    last_end: u32,
}

impl<'a> Network<'a> {
    pub fn new(table: &'a dyn Transitions, config: NetworkConfig) -> Network<'a> {
        Self::with_positions(table, config, PositionRegister::shared())
    }

    /// Chain onto an upstream network by adopting its position register,
    /// so upstream bridges apply here as well.
    pub fn with_positions(
        table: &'a dyn Transitions,
        config: NetworkConfig,
        positions: SharedPositions,
    ) -> Network<'a> {
        Network {
            table,
            config,
            positions,
            live: Vec::new(),
            confirmed: Vec::new(),
            origin: None,
            last_start: None,
            last_end: 0,
        }
    }

    pub fn positions(&self) -> SharedPositions {
        self.positions.clone()
    }

    /// Whether any live element can still continue, which lets callers
    /// distinguish "no match here yet" from a dead end.
    pub fn is_live(&self) -> bool {
        !self.live.is_empty()
    }

    /// Feed one input element, returning the terminal outputs it produced.
    pub fn append(&mut self, input: Element) -> Vec<Element> {
        if let Some(last) = self.last_start {
            assert!(
                input.start >= last,
                "inputs must arrive in non-decreasing start order ({} after {})",
                input.start,
                last,
            );
        }
        self.last_start = Some(input.start);
        self.process(&input, false)
    }

    /// Flush branches willing to terminate validly on end of input.
    pub fn finish(&mut self) -> Vec<Element> {
        self.flush()
    }

    /// Feed a whole stream and flush.
    pub fn run(&mut self, inputs: impl IntoIterator<Item = Element>) -> Vec<Element> {
        let mut out = Vec::new();
        for input in inputs {
            out.extend(self.append(input));
        }
        out.extend(self.finish());
        out
    }

    pub(crate) fn flush(&mut self) -> Vec<Element> {
        let at = match self.origin {
            Some(_) => self.last_end,
            None => 0,
        };
        debug!("flush at {at}");
        self.process(&Element::eof(at), true)
    }

    pub(crate) fn process(&mut self, input: &Element, at_eof: bool) -> Vec<Element> {
        assert!(input.is_terminal(), "network input must be a terminal element");

        let at = input.start;
        let first = self.origin.is_none();
        if first {
            self.origin = Some(at);
        }

        let can_open = first || self.config.allow_gaps || {
            let positions = self.positions.borrow();
            positions.same(self.origin.unwrap(), at)
                || self.live.iter().any(|e| positions.same(e.end, at))
                || self.confirmed.iter().any(|e| positions.same(e.end, at))
        };
        if !can_open {
            trace!("nothing ends at {at}, ignoring {input}");
            return Vec::new();
        }
        self.last_end = self.last_end.max(input.end);

        // a fresh cursor opens here, then every live element ending here
        // advances through the table. Advancing does not retire an element:
        // another input at the same canonical position (a fed-back result,
        // say) may advance it again later.
        let mut advancing = vec![Element::open(at, self.config.mode)];
        {
            let positions = self.positions.borrow();
            for element in &self.live {
                if positions.same(element.end, at) {
                    advancing.push(element.clone());
                }
            }
        }

        let item = input.item();
        let mut candidates = Vec::new();
        for element in advancing {
            let state = match &element.value {
                Value::State(state) => *state,
                Value::Name(_) => unreachable!("live elements are non-terminal"),
            };

            let mut results = Vec::new();
            let mut survives = false;
            for (action, value) in self.table.transition(state, &item) {
                // the end-of-stream pass may not consume anything
                if at_eof && *action != Action::Exclude {
                    continue;
                }
                let next = element.develop(action, value.clone(), input);
                survives |= !next.is_terminal();
                results.push((action, next));
            }

            for (action, next) in results {
                match &next.value {
                    Value::State(_) => {
                        if !self.live.contains(&next) {
                            self.live.push(next);
                        }
                    }
                    Value::Name(name) => {
                        if name.starts_with('!') {
                            trace!("discard {next}");
                        } else if survives && *action == Action::Exclude {
                            // an element that can keep consuming prefers
                            // to: its stop result is withheld
                            trace!("withhold {next}");
                        } else if self.config.skip.contains(name) {
                            debug!("bridge {}..{} over {name}", next.start, next.end);
                            self.positions.borrow_mut().merge(next.start, next.end);
                        } else {
                            candidates.push(next);
                        }
                    }
                }
            }
        }

        let out = {
            let positions = self.positions.borrow();
            (self.config.dedup)(&positions, &self.confirmed, &candidates)
        };
        self.confirmed.extend(out.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Collected;

    fn include(value: Value) -> Vec<(Action, Value)> {
        vec![(Action::Include, value)]
    }
    fn exclude(name: &str) -> Vec<(Action, Value)> {
        vec![(Action::Exclude, Value::Name(name.into()))]
    }

    /// INT = digit digit*, with the stop outcome offered alongside the
    /// continuation the way a built table offers it.
    struct IntTable {
        start: Vec<(Action, Value)>,
        grow: Vec<(Action, Value)>,
        stop: Vec<(Action, Value)>,
        reject: Vec<(Action, Value)>,
    }

    impl IntTable {
        fn new() -> IntTable {
            IntTable {
                start: include(Value::State(1)),
                grow: vec![
                    (Action::Include, Value::State(1)),
                    (Action::Exclude, Value::Name("INT".into())),
                ],
                stop: exclude("INT"),
                reject: exclude("!INT"),
            }
        }
    }

    impl Transitions for IntTable {
        fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)] {
            let digit = matches!(item, Item::Char(c) if c.is_ascii_digit());
            match (state, digit) {
                (0, true) => &self.start,
                (0, false) => &self.reject,
                (_, true) => &self.grow,
                (_, false) => &self.stop,
            }
        }
    }

    #[test]
    fn maximal_munch_round_trip() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        let out = network.run(Element::chars("123"));

        // one result spanning the whole input, not one per prefix
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 3));
        assert_eq!(out[0].name().map(|n| &**n), Some("INT"));
        assert_eq!(out[0].text(), Some("123"));
    }

    #[test]
    fn stop_outcome_fires_when_continuation_dies() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        let out = network.run(Element::chars("12x"));

        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 2));
        assert_eq!(out[0].text(), Some("12"));
    }

    #[test]
    fn no_match_yields_silence() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        let out = network.run(Element::chars("xy"));
        assert!(out.is_empty());
        assert!(!network.is_live());
    }

    #[test]
    fn empty_stream_without_valid_initial_state_yields_nothing() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        assert!(network.run([]).is_empty());
    }

    #[test]
    #[should_panic(expected = "terminal element")]
    fn feeding_a_non_terminal_element_is_fatal() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        network.append(Element::open(0, ContentMode::Text));
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn rewinding_inputs_is_fatal() {
        let table = IntTable::new();
        let mut network = Network::new(&table, NetworkConfig::default());
        network.append(Element::char_input(5, '1'));
        network.append(Element::char_input(2, '2'));
    }

    /// Accepts the empty input: state 0 excludes into UNIT on anything.
    struct UnitTable {
        accept: Vec<(Action, Value)>,
    }

    impl Transitions for UnitTable {
        fn transition(&self, _state: u32, _item: &Item) -> &[(Action, Value)] {
            &self.accept
        }
    }

    #[test]
    fn empty_stream_with_valid_initial_state_yields_one_output() {
        let table = UnitTable {
            accept: exclude("UNIT"),
        };
        let mut network = Network::new(&table, NetworkConfig::default());
        let out = network.run([]);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 0));
        assert_eq!(out[0].name().map(|n| &**n), Some("UNIT"));

        // flushing again reproduces the candidate, dedup eats it
        assert!(network.finish().is_empty());
    }

    /// Single-letter identifiers and a one-or-more space token.
    struct IdWsTable {
        id: Vec<(Action, Value)>,
        ws_start: Vec<(Action, Value)>,
        ws_grow: Vec<(Action, Value)>,
        ws_stop: Vec<(Action, Value)>,
        reject: Vec<(Action, Value)>,
    }

    impl IdWsTable {
        fn new() -> IdWsTable {
            IdWsTable {
                id: include(Value::Name("ID".into())),
                ws_start: include(Value::State(1)),
                ws_grow: vec![
                    (Action::Include, Value::State(1)),
                    (Action::Exclude, Value::Name("WHITESPACE".into())),
                ],
                ws_stop: exclude("WHITESPACE"),
                reject: exclude("!"),
            }
        }
    }

    impl Transitions for IdWsTable {
        fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)] {
            match (state, item) {
                (0, Item::Char(c)) if c.is_ascii_alphabetic() => &self.id,
                (0, Item::Char(' ')) => &self.ws_start,
                (0, _) => &self.reject,
                (_, Item::Char(' ')) => &self.ws_grow,
                (_, _) => &self.ws_stop,
            }
        }
    }

    #[test]
    fn skip_bridging_makes_positions_adjacent() {
        let table = IdWsTable::new();
        let config = NetworkConfig::default().skip("WHITESPACE");
        let mut network = Network::new(&table, config);
        let out = network.run(Element::chars("a  b"));

        assert_eq!(out.len(), 2);
        assert_eq!((out[0].start, out[0].end), (0, 1));
        assert_eq!((out[1].start, out[1].end), (3, 4));

        let positions = network.positions();
        let positions = positions.borrow();
        assert!(positions.same(out[0].end, out[1].start));
    }

    #[test]
    fn leading_skip_bridges_back_to_the_origin() {
        let table = IdWsTable::new();
        let config = NetworkConfig::default().skip("WHITESPACE");
        let mut network = Network::new(&table, config);
        let out = network.run(Element::chars(" a"));

        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (1, 2));
    }

    /// A chained parse layer: PAIR = ID ID over the lexer's output tags.
    struct PairTable {
        first: Vec<(Action, Value)>,
        second: Vec<(Action, Value)>,
        reject: Vec<(Action, Value)>,
    }

    impl Transitions for PairTable {
        fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)] {
            match (state, item) {
                (0, Item::Tag(tag)) if &**tag == "ID" => &self.first,
                (1, Item::Tag(tag)) if &**tag == "ID" => &self.second,
                _ => &self.reject,
            }
        }
    }

    #[test]
    fn downstream_network_adopts_upstream_bridges() {
        let lexer = IdWsTable::new();
        let mut tokens = Network::new(&lexer, NetworkConfig::default().skip("WHITESPACE"));
        let lexed = tokens.run(Element::chars("a  b"));

        let parser = PairTable {
            first: include(Value::State(1)),
            second: include(Value::Name("PAIR".into())),
            reject: exclude("!PAIR"),
        };
        let mut pairs = Network::with_positions(&parser, NetworkConfig::tree(), tokens.positions());
        let out = pairs.run(lexed);

        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end), (0, 4));
        assert_eq!(out[0].name().map(|n| &**n), Some("PAIR"));
    }

    struct AmbiguousTable {
        both: Vec<(Action, Value)>,
        reject: Vec<(Action, Value)>,
    }

    impl Transitions for AmbiguousTable {
        fn transition(&self, _state: u32, item: &Item) -> &[(Action, Value)] {
            match item {
                Item::Char('x') => &self.both,
                _ => &self.reject,
            }
        }
    }

    #[test]
    fn equal_priority_ambiguity_is_preserved() {
        let table = AmbiguousTable {
            both: vec![
                (Action::Include, Value::Name("A".into())),
                (Action::Include, Value::Name("B".into())),
            ],
            reject: exclude("!"),
        };
        let mut network = Network::new(&table, NetworkConfig::default());
        let out = network.run(Element::chars("x"));

        let names: Vec<&str> = out.iter().filter_map(|e| e.name()).map(|n| &**n).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    fn named(name: &str, start: u32, end: u32) -> Element {
        let mut element = Element::open(start, ContentMode::Text);
        element.end = end;
        element.value = Value::Name(name.into());
        element
    }

    #[test]
    fn default_dedup_prefers_longest_at_a_given_end() {
        let positions = PositionRegister::new();
        let batch = [named("INT", 2, 3), named("INT", 0, 3), named("INT", 1, 3)];
        let out = default_dedup(&positions, &[], &batch);
        assert_eq!(out, vec![named("INT", 0, 3)]);
    }

    #[test]
    fn default_dedup_keeps_distinct_values_over_the_same_span() {
        let positions = PositionRegister::new();
        let batch = [named("A", 0, 3), named("B", 0, 3)];
        let out = default_dedup(&positions, &[], &batch);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn default_dedup_drops_exact_repeats_of_kept_elements() {
        let positions = PositionRegister::new();
        let kept = [named("INT", 0, 3)];
        let out = default_dedup(&positions, &kept, &[named("INT", 0, 3)]);
        assert!(out.is_empty());
    }

    #[test]
    fn distinct_dedup_keeps_same_value_at_different_starts() {
        let positions = PositionRegister::new();
        let batch = [named("N", 1, 3), named("N", 0, 3)];
        assert_eq!(distinct_dedup(&positions, &[], &batch).len(), 2);
        // but never an exact repeat
        assert!(distinct_dedup(&positions, &batch, &[named("N", 1, 3)]).is_empty());
    }

    /// LIST = N (collect-in) N (collect-in), exercising tree payloads.
    struct ListTable {
        first: Vec<(Action, Value)>,
        second: Vec<(Action, Value)>,
        reject: Vec<(Action, Value)>,
    }

    impl Transitions for ListTable {
        fn transition(&self, state: u32, item: &Item) -> &[(Action, Value)] {
            match (state, item) {
                (0, Item::Tag(tag)) if &**tag == "N" => &self.first,
                (1, Item::Tag(tag)) if &**tag == "N" => &self.second,
                _ => &self.reject,
            }
        }
    }

    #[test]
    fn collected_children_survive_into_outputs() {
        let table = ListTable {
            first: vec![(Action::CollectIn("items".into()), Value::State(1))],
            second: vec![(Action::CollectIn("items".into()), Value::Name("LIST".into()))],
            reject: exclude("!LIST"),
        };

        let n1 = named("N", 0, 1);
        let n2 = named("N", 1, 2);

        let mut network = Network::new(&table, NetworkConfig::tree());
        let out = network.run([n1, n2]);

        assert_eq!(out.len(), 1);
        match out[0].child("items") {
            Some(Collected::Many(list)) => {
                assert_eq!(list.len(), 2);
                assert_eq!(list[0].name().map(|n| &**n), Some("N"));
            }
            other => panic!("expected collected list, got {other:?}"),
        }
    }
}
