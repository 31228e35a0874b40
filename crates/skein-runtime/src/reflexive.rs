use std::collections::{HashSet, VecDeque};

use log::{debug, trace};
use skein_core::RcString;

use crate::element::Element;
use crate::network::{Network, NetworkConfig, NetworkError, Transitions};
use crate::position::SharedPositions;

const DEFAULT_LIMIT: usize = 10_000;

/// A network whose own outputs feed back in as inputs.
///
/// Outputs with a name in the feedback set are queued and re-processed
/// until no new element appears, which lets a single table handle
/// self-referential productions (a result built from smaller results of
/// the same name). Every fed-back element is remembered, so the fixed
/// point terminates as long as the grammar only builds finitely many
/// distinct elements; a defensive step limit catches the rest.
pub struct ReflexiveNetwork<'a> {
    network: Network<'a>,
    feedback: HashSet<RcString>,
    done: HashSet<Element>,
    limit: usize,
    last_start: Option<u32>,
}

impl<'a> ReflexiveNetwork<'a> {
    pub fn new(
        table: &'a dyn Transitions,
        config: NetworkConfig,
        feedback: impl IntoIterator<Item = RcString>,
    ) -> ReflexiveNetwork<'a> {
        ReflexiveNetwork {
            network: Network::new(table, config),
            feedback: feedback.into_iter().collect(),
            done: HashSet::new(),
            limit: DEFAULT_LIMIT,
            last_start: None,
        }
    }

    pub fn with_positions(
        table: &'a dyn Transitions,
        config: NetworkConfig,
        feedback: impl IntoIterator<Item = RcString>,
        positions: SharedPositions,
    ) -> ReflexiveNetwork<'a> {
        ReflexiveNetwork {
            network: Network::with_positions(table, config, positions),
            feedback: feedback.into_iter().collect(),
            done: HashSet::new(),
            limit: DEFAULT_LIMIT,
            last_start: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> ReflexiveNetwork<'a> {
        self.limit = limit;
        self
    }

    pub fn positions(&self) -> SharedPositions {
        self.network.positions()
    }

    /// Feed one input element and settle the feedback cascade it triggers.
    pub fn append(&mut self, input: Element) -> Result<Vec<Element>, NetworkError> {
        if let Some(last) = self.last_start {
            assert!(
                input.start >= last,
                "inputs must arrive in non-decreasing start order ({} after {})",
                input.start,
                last,
            );
        }
        self.last_start = Some(input.start);
        self.drain(VecDeque::from([input]))
    }

    /// Flush end-of-stream terminations, feeding them back until quiet.
    pub fn finish(&mut self) -> Result<Vec<Element>, NetworkError> {
        let mut out = Vec::new();
        let mut rounds = 0usize;
        loop {
            let flushed = self.network.flush();
            if flushed.is_empty() {
                return Ok(out);
            }
            rounds += 1;
            if rounds > self.limit {
                return Err(NetworkError::NonTermination { limit: self.limit });
            }
            let mut queue = VecDeque::new();
            for element in flushed {
                if self.wants_feedback(&element) {
                    queue.push_back(element.clone());
                }
                out.push(element);
            }
            out.extend(self.drain(queue)?);
        }
    }

    pub fn run(
        &mut self,
        inputs: impl IntoIterator<Item = Element>,
    ) -> Result<Vec<Element>, NetworkError> {
        let mut out = Vec::new();
        for input in inputs {
            out.extend(self.append(input)?);
        }
        out.extend(self.finish()?);
        Ok(out)
    }

    fn wants_feedback(&self, element: &Element) -> bool {
        element
            .name()
            .is_some_and(|name| self.feedback.contains(name))
    }

    fn drain(&mut self, mut queue: VecDeque<Element>) -> Result<Vec<Element>, NetworkError> {
        let mut out = Vec::new();
        let mut steps = 0usize;
        while let Some(next) = queue.pop_front() {
            if !self.done.insert(next.clone()) {
                trace!("already settled {next}");
                continue;
            }
            steps += 1;
            if steps > self.limit {
                return Err(NetworkError::NonTermination { limit: self.limit });
            }
            for element in self.network.process(&next, false) {
                if self.wants_feedback(&element) {
                    debug!("feeding back {element}");
                    queue.push_back(element.clone());
                }
                out.push(element);
            }
        }
        Ok(out)
    }
}
