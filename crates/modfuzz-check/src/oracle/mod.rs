//! Test-run oracle.
//!
//! A [`TestRun`] owns one graph and the buffers the harness fills while the
//! host loads it. Its state machine is `Built -> Observing -> Concluded`:
//!
//! - `Built`: buffers sized to the graph and empty.
//! - `Observing`: `start`, `finish` and per-node `error` events fold into the
//!   buffers. `loaded` or an out-of-band page error ends observation.
//! - `Concluded`: a [`Verdict`] is fixed and any further event is a protocol
//!   error.
//!
//! On `loaded` the buffers are compared against the graph's
//! [`Expectation`]: element by element for exact graphs, against
//! [`Invariants`] otherwise.

pub mod expect;
pub mod report;

pub use expect::{Expectation, ExpectedTrace, Invariants};
pub use report::FailureReport;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use modfuzz_core::graph::Graph;
use modfuzz_core::id::NodeId;

use crate::error::ProtocolError;
use crate::harness::HarnessEvent;

/// Oracle options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Compare per-node `errored` flags. Only meaningful when the harness
    /// reports generated errors per node.
    pub check_errors: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig { check_errors: true }
    }
}

/// What the harness reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub order: Vec<NodeId>,
    pub started: Vec<bool>,
    pub finished: Vec<bool>,
    pub errored: Vec<bool>,
}

impl Observation {
    fn new(size: usize) -> Self {
        Observation {
            order: Vec::new(),
            started: vec![false; size],
            finished: vec![false; size],
            errored: vec![false; size],
        }
    }
}

/// One disagreement between expectation and observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    Order {
        expected: Vec<NodeId>,
        observed: Vec<NodeId>,
    },
    Started { node: NodeId, expected: bool },
    Finished { node: NodeId, expected: bool },
    Errored { node: NodeId, expected: bool },
}

fn list(ids: &[NodeId]) -> String {
    let parts: Vec<String> = ids.iter().map(NodeId::to_string).collect();
    format!("[{}]", parts.join(", "))
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = |expected: bool| if expected { "" } else { "not " };
        match self {
            Mismatch::Order { expected, observed } => {
                write!(f, "order: expected {}, observed {}", list(expected), list(observed))
            }
            Mismatch::Started { node, expected } => {
                write!(f, "node {node}: expected {}started", not(*expected))
            }
            Mismatch::Finished { node, expected } => {
                write!(f, "node {node}: expected {}finished", not(*expected))
            }
            Mismatch::Errored { node, expected } => {
                write!(f, "node {node}: expected {}errored", not(*expected))
            }
        }
    }
}

/// Outcome of a concluded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Fail { mismatches: Vec<Mismatch> },
    /// The page itself reported an error the graph did not generate.
    Error { message: String },
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => f.write_str("OK"),
            Verdict::Fail { .. } => f.write_str("FAIL"),
            Verdict::Error { message } => write!(f, "ERROR {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Built,
    Observing,
    Concluded(Verdict),
}

/// One graph under test plus everything observed about it.
#[derive(Debug, Clone)]
pub struct TestRun {
    graph: Graph,
    config: OracleConfig,
    expectation: Expectation,
    observation: Observation,
    state: RunState,
}

impl TestRun {
    pub fn new(graph: Graph, config: OracleConfig) -> Self {
        let expectation = Expectation::for_graph(&graph);
        let observation = Observation::new(graph.size());
        TestRun {
            graph,
            config,
            expectation,
            observation,
            state: RunState::Built,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> OracleConfig {
        self.config
    }

    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.state {
            RunState::Concluded(verdict) => Some(verdict),
            _ => None,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.verdict().is_some()
    }

    /// Folds one event into the run. Returns the verdict once concluded.
    pub fn apply(&mut self, event: HarnessEvent) -> Result<Option<&Verdict>, ProtocolError> {
        if self.is_concluded() {
            return Err(ProtocolError::AfterConclusion {
                event: event.to_string(),
            });
        }
        if let Some(index) = event.node() {
            if index.index() >= self.graph.size() {
                return Err(ProtocolError::IndexOutOfRange {
                    event: event.to_string(),
                    index: index.0,
                    size: self.graph.size(),
                });
            }
        }
        self.state = RunState::Observing;

        match event {
            HarnessEvent::Start(node) => {
                self.observation.started[node.index()] = true;
                self.observation.order.push(node);
            }
            HarnessEvent::Finish(node) => {
                self.observation.finished[node.index()] = true;
            }
            HarnessEvent::GeneratedError(node) => {
                self.observation.errored[node.index()] = true;
            }
            HarnessEvent::Loaded => {
                let verdict = self.judge();
                self.conclude(verdict);
            }
            HarnessEvent::PageError(message) => {
                self.conclude(Verdict::Error { message });
            }
        }
        Ok(self.verdict())
    }

    /// Parses and folds every line of a recorded trace, skipping blank lines.
    /// The trace must conclude the run.
    pub fn feed<I, S>(&mut self, lines: I) -> Result<&Verdict, ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            self.apply(line.parse()?)?;
        }
        self.verdict().ok_or(ProtocolError::Unfinished)
    }

    fn conclude(&mut self, verdict: Verdict) {
        let graph = self.graph.serialized();
        match &verdict {
            Verdict::Ok => info!(graph, "test finished: OK"),
            Verdict::Fail { mismatches } => {
                warn!(graph, mismatches = mismatches.len(), "test finished: FAIL")
            }
            Verdict::Error { message } => warn!(graph, message = %message, "test finished: ERROR"),
        }
        self.state = RunState::Concluded(verdict);
    }

    fn judge(&self) -> Verdict {
        let mismatches = match &self.expectation {
            Expectation::Exact(expected) => self.compare_exact(expected),
            Expectation::Inexact(invariants) => self.compare_invariants(invariants),
        };
        if mismatches.is_empty() {
            Verdict::Ok
        } else {
            Verdict::Fail { mismatches }
        }
    }

    fn compare_exact(&self, expected: &ExpectedTrace) -> Vec<Mismatch> {
        let observed = &self.observation;
        let mut mismatches = Vec::new();
        if observed.order != expected.order {
            mismatches.push(Mismatch::Order {
                expected: expected.order.clone(),
                observed: observed.order.clone(),
            });
        }
        // The root document never reports, so index 0 is skipped.
        for node in self.graph.node_ids().skip(1) {
            let i = node.index();
            if observed.started[i] != expected.started[i] {
                mismatches.push(Mismatch::Started {
                    node,
                    expected: expected.started[i],
                });
            }
            if observed.finished[i] != expected.finished[i] {
                mismatches.push(Mismatch::Finished {
                    node,
                    expected: expected.finished[i],
                });
            }
            if self.config.check_errors && observed.errored[i] != expected.errored[i] {
                mismatches.push(Mismatch::Errored {
                    node,
                    expected: expected.errored[i],
                });
            }
        }
        mismatches
    }

    fn compare_invariants(&self, invariants: &Invariants) -> Vec<Mismatch> {
        let observed = &self.observation;
        let mut mismatches = Vec::new();
        for &node in &invariants.must_finish {
            if !observed.started[node.index()] {
                mismatches.push(Mismatch::Started {
                    node,
                    expected: true,
                });
            }
            if !observed.finished[node.index()] {
                mismatches.push(Mismatch::Finished {
                    node,
                    expected: true,
                });
            }
        }
        for &node in &invariants.must_not_finish {
            if observed.finished[node.index()] {
                mismatches.push(Mismatch::Finished {
                    node,
                    expected: false,
                });
            }
        }
        for &node in &invariants.must_not_start {
            if observed.started[node.index()] {
                mismatches.push(Mismatch::Started {
                    node,
                    expected: false,
                });
            }
            if observed.finished[node.index()] {
                mismatches.push(Mismatch::Finished {
                    node,
                    expected: false,
                });
            }
        }
        mismatches
    }

    /// Diagnostic dump of the graph, the observation and the expectation.
    pub fn report(&self) -> FailureReport<'_> {
        FailureReport::new(self)
    }
}
