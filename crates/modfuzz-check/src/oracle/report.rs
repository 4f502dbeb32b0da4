//! Diagnostic dump printed when a run does not pass.

use std::fmt;

use serde::Serialize;

use modfuzz_core::graph::Graph;
use modfuzz_core::id::NodeId;

use super::{Expectation, Observation, TestRun, Verdict};

/// Everything needed to reproduce and diagnose one run. `Display` gives the
/// human-readable dump; `Serialize` gives the same content as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport<'a> {
    #[serde(skip)]
    graph: &'a Graph,
    #[serde(rename = "graph")]
    serialized: &'a str,
    expectation: &'a Expectation,
    observation: &'a Observation,
    verdict: Option<&'a Verdict>,
}

impl<'a> FailureReport<'a> {
    pub(crate) fn new(run: &'a TestRun) -> Self {
        FailureReport {
            graph: run.graph(),
            serialized: run.graph().serialized(),
            expectation: run.expectation(),
            observation: run.observation(),
            verdict: run.verdict(),
        }
    }
}

fn join(ids: impl IntoIterator<Item = NodeId>) -> String {
    let parts: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    parts.join(", ")
}

/// Indices set in `flags`, root excluded.
fn set(flags: &[bool]) -> String {
    join(
        flags
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, flag)| **flag)
            .map(|(i, _)| NodeId(i as u32)),
    )
}

/// Writes `label: value`, without a trailing space when `value` is empty.
fn field(f: &mut fmt::Formatter<'_>, label: &str, value: String) -> fmt::Result {
    if value.is_empty() {
        writeln!(f, "{label}:")
    } else {
        writeln!(f, "{label}: {value}")
    }
}

/// The expected lines of the dump.
impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Exact(expected) => {
                field(f, "Expected order", join(expected.order.iter().copied()))?;
                field(f, "Expected started", set(&expected.started))?;
                field(f, "Expected finished", set(&expected.finished))?;
                field(f, "Expected errored", set(&expected.errored))
            }
            Expectation::Inexact(invariants) => {
                field(f, "Must finish", join(invariants.must_finish.iter().copied()))?;
                field(f, "Must not finish", join(invariants.must_not_finish.iter().copied()))?;
                field(f, "Must not start", join(invariants.must_not_start.iter().copied()))
            }
        }
    }
}

impl fmt::Display for FailureReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.graph.describe())?;

        let observed = self.observation;
        field(f, "Load order", join(observed.order.iter().copied()))?;
        field(f, "Started", set(&observed.started))?;
        field(f, "Finished", set(&observed.finished))?;
        field(f, "Errored", set(&observed.errored))?;

        write!(f, "{}", self.expectation)?;

        match self.verdict {
            Some(verdict) => {
                write!(f, "Verdict: {verdict}")?;
                if let Verdict::Fail { mismatches } = verdict {
                    for mismatch in mismatches {
                        write!(f, "\n  {mismatch}")?;
                    }
                }
                Ok(())
            }
            None => write!(f, "Verdict: pending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::oracle::{OracleConfig, TestRun};

    #[test]
    fn dump_lists_graph_observation_and_expectation() {
        let mut run = TestRun::new("3;1,1;m1,2;me0".parse().unwrap(), OracleConfig::default());
        run.feed(["start 2", "finish 2", "start 1", "loaded"]).unwrap();
        insta::assert_snapshot!(run.report().to_string(), @r###"
        Graph of 3 nodes: 3;1,1;m1,2;me0
          Import map: none
          Node 0 root
           -> node 1
          Node 1 module
           -> node 2
          Node 2 module error
        Load order: 2, 1
        Started: 1, 2
        Finished: 2
        Errored:
        Expected order: 2, 1
        Expected started: 1, 2
        Expected finished:
        Expected errored: 2
        Verdict: FAIL
          node 2: expected not finished
          node 2: expected errored
        "###);
    }

    #[test]
    fn dump_for_cyclic_graph_lists_invariants() {
        let run = TestRun::new("3;1,1;m1,2;m1,1".parse().unwrap(), OracleConfig::default());
        let dump = run.report().to_string();
        assert!(dump.contains("Must finish: 1, 2"));
        assert!(dump.ends_with("Verdict: pending"));
    }

    #[test]
    fn json_report_names_graph_and_verdict() {
        let mut run = TestRun::new("2;1,1;m0".parse().unwrap(), OracleConfig::default());
        run.feed(["start 1", "finish 1", "loaded"]).unwrap();
        let json = serde_json::to_value(run.report()).unwrap();
        assert_eq!(json["graph"], "2;1,1;m0");
        assert_eq!(json["verdict"]["verdict"], "ok");
        assert_eq!(json["expectation"]["kind"], "exact");
    }
}
