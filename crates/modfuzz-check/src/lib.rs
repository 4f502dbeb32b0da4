//! Generation and checking for module-loading test cases.
//!
//! - [`generator`] builds random graphs from a [`Probabilities`] model.
//! - [`oracle`] predicts what a correct host reports for a graph and judges
//!   an observed trace.
//! - [`harness`] parses the page's event lines and runs fuzz sessions.

pub mod error;
pub mod generator;
pub mod harness;
pub mod oracle;

pub use error::{ConfigError, GenerateError, ProtocolError};
pub use generator::{generate, Probabilities};
pub use harness::{FuzzSession, HarnessEvent, SessionStats};
pub use oracle::{Expectation, OracleConfig, TestRun, Verdict};
