//! Harness adapter: the event vocabulary the loaded page reports, and the
//! fuzz loop that drives one test run after another.
//!
//! Events are single text lines:
//!
//! | line                       | meaning                                 |
//! |----------------------------|-----------------------------------------|
//! | `start <i>`                | node `i` began evaluating               |
//! | `finish <i>`               | node `i` finished evaluating            |
//! | `error GeneratedError <i>` | node `i` threw its generated error      |
//! | `error <message>`          | the page reported any other error       |
//! | `loaded`                   | the root document finished loading      |

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

use modfuzz_core::id::NodeId;

use crate::error::{ConfigError, GenerateError, ProtocolError};
use crate::generator::{self, Probabilities, MIN_SIZE};
use crate::oracle::{OracleConfig, TestRun, Verdict};

const GENERATED_ERROR: &str = "GeneratedError";

/// One message from the page under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessEvent {
    Start(NodeId),
    Finish(NodeId),
    GeneratedError(NodeId),
    PageError(String),
    Loaded,
}

impl HarnessEvent {
    /// The node the event names, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            HarnessEvent::Start(node)
            | HarnessEvent::Finish(node)
            | HarnessEvent::GeneratedError(node) => Some(*node),
            HarnessEvent::PageError(_) | HarnessEvent::Loaded => None,
        }
    }
}

fn parse_index(event: &str, token: Option<&str>) -> Result<NodeId, ProtocolError> {
    let token = token.map(str::trim).filter(|t| !t.is_empty()).ok_or_else(|| {
        ProtocolError::MissingIndex {
            event: event.to_string(),
        }
    })?;
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::BadIndex {
            event: event.to_string(),
            token: token.to_string(),
        });
    }
    token.parse().map(NodeId).map_err(|_| ProtocolError::BadIndex {
        event: event.to_string(),
        token: token.to_string(),
    })
}

impl FromStr for HarnessEvent {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (word, rest) = match line.split_once(' ') {
            Some((word, rest)) => (word, Some(rest)),
            None => (line, None),
        };
        match word {
            "start" => Ok(HarnessEvent::Start(parse_index(line, rest)?)),
            "finish" => Ok(HarnessEvent::Finish(parse_index(line, rest)?)),
            "loaded" if rest.is_none() => Ok(HarnessEvent::Loaded),
            "error" => {
                let message = rest.unwrap_or_default();
                match message.split_once(' ') {
                    Some((GENERATED_ERROR, index)) => {
                        Ok(HarnessEvent::GeneratedError(parse_index(line, Some(index))?))
                    }
                    _ if message == GENERATED_ERROR => Err(ProtocolError::MissingIndex {
                        event: line.to_string(),
                    }),
                    _ => Ok(HarnessEvent::PageError(message.to_string())),
                }
            }
            _ => Err(ProtocolError::UnknownEvent {
                line: line.to_string(),
            }),
        }
    }
}

impl fmt::Display for HarnessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessEvent::Start(node) => write!(f, "start {node}"),
            HarnessEvent::Finish(node) => write!(f, "finish {node}"),
            HarnessEvent::GeneratedError(node) => write!(f, "error {GENERATED_ERROR} {node}"),
            HarnessEvent::PageError(message) => write!(f, "error {message}"),
            HarnessEvent::Loaded => f.write_str("loaded"),
        }
    }
}

/// Counters for a fuzzing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub runs: u64,
    pub ok: u64,
    pub failed: u64,
    pub errors: u64,
    pub tests_per_second: f64,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} runs: {} ok, {} failed, {} errors ({:.1} tests/s)",
            self.runs, self.ok, self.failed, self.errors, self.tests_per_second
        )
    }
}

/// Generates test runs from one seeded RNG and tallies their verdicts.
#[derive(Debug)]
pub struct FuzzSession {
    seed: u64,
    rng: ChaCha8Rng,
    probabilities: Probabilities,
    oracle: OracleConfig,
    min_size: usize,
    max_size: usize,
    started_at: Instant,
    stats: SessionStats,
}

impl FuzzSession {
    /// Graph sizes drawn when no range is given: the root plus 1 to 8 scripts.
    pub const DEFAULT_MAX_SIZE: usize = 9;

    pub fn new(
        seed: u64,
        probabilities: Probabilities,
        oracle: OracleConfig,
    ) -> Result<Self, ConfigError> {
        probabilities.validate()?;
        Ok(FuzzSession {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            probabilities,
            oracle,
            min_size: MIN_SIZE,
            max_size: Self::DEFAULT_MAX_SIZE,
            started_at: Instant::now(),
            stats: SessionStats::default(),
        })
    }

    /// Draws sizes from `min..=max` instead of the default range.
    pub fn with_size_range(mut self, min: usize, max: usize) -> Result<Self, ConfigError> {
        if min < MIN_SIZE {
            return Err(ConfigError::GraphTooSmall { size: min });
        }
        if max < min {
            return Err(ConfigError::InvalidSizeRange { min, max });
        }
        self.min_size = min;
        self.max_size = max;
        Ok(self)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates the next graph and wraps it in a fresh run.
    pub fn next_run(&mut self) -> Result<TestRun, GenerateError> {
        let size = self.rng.gen_range(self.min_size..=self.max_size);
        let graph = generator::generate(size, &self.probabilities, &mut self.rng)?;
        debug!(graph = graph.serialized(), "generated test case");
        Ok(TestRun::new(graph, self.oracle))
    }

    /// Tallies a concluded run's verdict.
    pub fn record(&mut self, verdict: &Verdict) {
        self.stats.runs += 1;
        match verdict {
            Verdict::Ok => self.stats.ok += 1,
            Verdict::Fail { .. } => self.stats.failed += 1,
            Verdict::Error { .. } => self.stats.errors += 1,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats_at(self.started_at.elapsed())
    }

    fn stats_at(&self, elapsed: Duration) -> SessionStats {
        let seconds = elapsed.as_secs_f64();
        let tests_per_second = if seconds > 0.0 {
            self.stats.runs as f64 / seconds
        } else {
            0.0
        };
        SessionStats {
            tests_per_second,
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_event_kind() {
        assert_eq!("start 3".parse::<HarnessEvent>(), Ok(HarnessEvent::Start(NodeId(3))));
        assert_eq!("finish 0".parse::<HarnessEvent>(), Ok(HarnessEvent::Finish(NodeId(0))));
        assert_eq!(
            "error GeneratedError 4".parse::<HarnessEvent>(),
            Ok(HarnessEvent::GeneratedError(NodeId(4)))
        );
        assert_eq!(
            "error TypeError: x is not a function".parse::<HarnessEvent>(),
            Ok(HarnessEvent::PageError("TypeError: x is not a function".into()))
        );
        assert_eq!("error".parse::<HarnessEvent>(), Ok(HarnessEvent::PageError(String::new())));
        assert_eq!("loaded".parse::<HarnessEvent>(), Ok(HarnessEvent::Loaded));
    }

    #[test]
    fn display_matches_wire_form() {
        for line in [
            "start 3",
            "finish 12",
            "error GeneratedError 4",
            "error boom",
            "loaded",
        ] {
            let event: HarnessEvent = line.parse().unwrap();
            assert_eq!(event.to_string(), line);
        }
    }

    #[test]
    fn rejects_malformed_events() {
        assert_eq!(
            "begin 1".parse::<HarnessEvent>(),
            Err(ProtocolError::UnknownEvent {
                line: "begin 1".into()
            })
        );
        assert!(matches!(
            "start".parse::<HarnessEvent>(),
            Err(ProtocolError::MissingIndex { .. })
        ));
        assert!(matches!(
            "finish x".parse::<HarnessEvent>(),
            Err(ProtocolError::BadIndex { .. })
        ));
        assert!(matches!(
            "start -1".parse::<HarnessEvent>(),
            Err(ProtocolError::BadIndex { .. })
        ));
        assert!(matches!(
            "error GeneratedError".parse::<HarnessEvent>(),
            Err(ProtocolError::MissingIndex { .. })
        ));
        assert!(matches!(
            "loaded now".parse::<HarnessEvent>(),
            Err(ProtocolError::UnknownEvent { .. })
        ));
    }

    #[test]
    fn session_is_reproducible_from_seed() {
        let mut a = FuzzSession::new(5, Probabilities::default(), OracleConfig::default()).unwrap();
        let mut b = FuzzSession::new(5, Probabilities::default(), OracleConfig::default()).unwrap();
        for _ in 0..10 {
            let left = a.next_run().unwrap();
            let right = b.next_run().unwrap();
            assert_eq!(left.graph(), right.graph());
            assert!((MIN_SIZE..=FuzzSession::DEFAULT_MAX_SIZE).contains(&left.graph().size()));
        }
    }

    #[test]
    fn session_tallies_verdicts() {
        let mut session =
            FuzzSession::new(1, Probabilities::none(), OracleConfig::default()).unwrap();
        session.record(&Verdict::Ok);
        session.record(&Verdict::Ok);
        session.record(&Verdict::Fail { mismatches: vec![] });
        session.record(&Verdict::Error {
            message: "boom".into(),
        });
        let stats = session.stats_at(Duration::from_secs(2));
        assert_eq!((stats.runs, stats.ok, stats.failed, stats.errors), (4, 2, 1, 1));
        assert_eq!(stats.tests_per_second, 2.0);
        assert_eq!(
            stats.to_string(),
            "4 runs: 2 ok, 1 failed, 1 errors (2.0 tests/s)"
        );
    }

    #[test]
    fn size_range_is_checked() {
        let session = FuzzSession::new(1, Probabilities::none(), OracleConfig::default()).unwrap();
        assert!(matches!(
            session.with_size_range(1, 4),
            Err(ConfigError::GraphTooSmall { size: 1 })
        ));
        let session = FuzzSession::new(1, Probabilities::none(), OracleConfig::default()).unwrap();
        let mut session = session.with_size_range(3, 3).unwrap();
        assert_eq!(session.next_run().unwrap().graph().size(), 3);
    }
}
