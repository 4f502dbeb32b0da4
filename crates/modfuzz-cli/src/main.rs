//! Module-loading fuzzer CLI.
//!
//! Provides the `modfuzz` binary:
//!
//! - `generate` prints seeded random graphs as permalink strings.
//! - `show` describes a graph and what a correct host reports for it.
//! - `render` writes every served artifact of a graph to a directory.
//! - `check` judges a recorded harness trace against a graph.
//!
//! Logs go to stderr; `-v` enables debug output, `-vv` trace output.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, Level};

use modfuzz_check::oracle::{OracleConfig, TestRun, Verdict};
use modfuzz_check::{FuzzSession, Probabilities};
use modfuzz_core::artifact::{self, Artifact};
use modfuzz_core::graph::Graph;

/// Module-loading fuzzer and oracle.
#[derive(Parser)]
#[command(name = "modfuzz", about = "Module-loading fuzzer and oracle")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate random graphs and print their serialized strings.
    Generate {
        /// RNG seed (default: random, printed to stderr).
        #[arg(long)]
        seed: Option<u64>,

        /// Exact graph size, root included (default: 2 to 9).
        #[arg(short, long)]
        size: Option<usize>,

        /// Number of graphs to generate.
        #[arg(short, long, default_value_t = 1)]
        count: u64,

        /// Also print each graph's description and expectation.
        #[arg(long)]
        show: bool,

        /// JSON file with generator probabilities.
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ProbabilityArgs,
    },

    /// Describe a graph and its expected trace.
    Show {
        /// Serialized graph string.
        graph: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Write every artifact of a graph as `<index>.<ext>`.
    Render {
        /// Serialized graph string.
        graph: String,

        /// Output directory.
        #[arg(short, long, default_value = "./graph")]
        out: PathBuf,
    },

    /// Check a recorded harness trace against a graph.
    Check {
        /// Serialized graph string.
        graph: String,

        /// File with one harness event per line (default: stdin).
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Ignore per-node generated-error events.
        #[arg(long)]
        no_check_errors: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Per-parameter overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
struct ProbabilityArgs {
    #[arg(long = "p-import-map")]
    import_map: Option<f64>,
    #[arg(long = "p-static-import-map")]
    static_import_map: Option<f64>,
    #[arg(long = "p-module")]
    module: Option<f64>,
    #[arg(long = "p-multi-parent")]
    multi_parent: Option<f64>,
    #[arg(long = "p-cyclic")]
    cyclic: Option<f64>,
    #[arg(long = "p-not-found")]
    not_found: Option<f64>,
    #[arg(long = "p-error")]
    error: Option<f64>,
    #[arg(long = "p-top-level-await")]
    top_level_await: Option<f64>,
    #[arg(long = "p-slow")]
    slow: Option<f64>,
    #[arg(long = "p-preload")]
    preload: Option<f64>,
    #[arg(long = "p-dynamic")]
    dynamic: Option<f64>,
    #[arg(long = "p-bare")]
    bare: Option<f64>,
}

impl ProbabilityArgs {
    fn apply(&self, base: Probabilities) -> Probabilities {
        Probabilities {
            import_map: self.import_map.unwrap_or(base.import_map),
            static_import_map: self.static_import_map.unwrap_or(base.static_import_map),
            module: self.module.unwrap_or(base.module),
            multi_parent: self.multi_parent.unwrap_or(base.multi_parent),
            cyclic: self.cyclic.unwrap_or(base.cyclic),
            not_found: self.not_found.unwrap_or(base.not_found),
            error: self.error.unwrap_or(base.error),
            top_level_await: self.top_level_await.unwrap_or(base.top_level_await),
            slow: self.slow.unwrap_or(base.slow),
            preload: self.preload.unwrap_or(base.preload),
            dynamic: self.dynamic.unwrap_or(base.dynamic),
            bare: self.bare.unwrap_or(base.bare),
        }
    }
}

/// Exit codes shared by every subcommand.
const EXIT_OK: i32 = 0;
const EXIT_FAIL: i32 = 1;
const EXIT_ERROR: i32 = 2;
const EXIT_INPUT: i32 = 3;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .init();

    let exit_code = match cli.command {
        Commands::Generate {
            seed,
            size,
            count,
            show,
            config,
            overrides,
        } => run_generate(seed, size, count, show, config.as_deref(), &overrides),
        Commands::Show { graph, json } => run_show(&graph, json),
        Commands::Render { graph, out } => run_render(&graph, &out),
        Commands::Check {
            graph,
            trace,
            no_check_errors,
            json,
        } => run_check(&graph, trace.as_deref(), !no_check_errors, json),
    };
    process::exit(exit_code);
}

fn parse_graph(text: &str) -> Result<Graph, i32> {
    text.parse().map_err(|e| {
        eprintln!("Error: invalid graph '{}': {}", text, e);
        EXIT_INPUT
    })
}

/// Execute the generate subcommand.
///
/// Returns exit code: 0 = success, 3 = bad configuration.
fn run_generate(
    seed: Option<u64>,
    size: Option<usize>,
    count: u64,
    show: bool,
    config: Option<&Path>,
    overrides: &ProbabilityArgs,
) -> i32 {
    let base = match config {
        Some(path) => match Probabilities::from_json_file(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_INPUT;
            }
        },
        None => Probabilities::default(),
    };
    let probabilities = overrides.apply(base);

    let seed = seed.unwrap_or_else(rand::random);
    info!(seed, "generating {} graph(s)", count);

    let session = FuzzSession::new(seed, probabilities, OracleConfig::default())
        .and_then(|session| match size {
            Some(size) => session.with_size_range(size, size),
            None => Ok(session),
        });
    let mut session = match session {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };

    for _ in 0..count {
        let run = match session.next_run() {
            Ok(run) => run,
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_ERROR;
            }
        };
        println!("{}", run.graph());
        if show {
            println!("{}", run.graph().describe());
            print!("{}", run.expectation());
            println!();
        }
    }
    EXIT_OK
}

/// Execute the show subcommand.
///
/// Returns exit code: 0 = success, 3 = invalid graph.
fn run_show(text: &str, json: bool) -> i32 {
    let graph = match parse_graph(text) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let run = TestRun::new(graph, OracleConfig::default());

    if json {
        let value = serde_json::json!({
            "graph": run.graph().serialized(),
            "root_url": artifact::root_url(run.graph()),
            "expectation": run.expectation(),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize: {}", e);
                return EXIT_INPUT;
            }
        }
    } else {
        println!("{}", run.graph().describe());
        print!("{}", run.expectation());
    }
    EXIT_OK
}

/// Execute the render subcommand.
///
/// Returns exit code: 0 = success, 3 = invalid graph or I/O error.
fn run_render(text: &str, out: &Path) -> i32 {
    let graph = match parse_graph(text) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let artifacts = match artifact::render_all(&graph) {
        Ok(artifacts) => artifacts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };

    if let Err(e) = fs::create_dir_all(out) {
        eprintln!("Error: failed to create '{}': {}", out.display(), e);
        return EXIT_INPUT;
    }
    for artifact in &artifacts {
        if let Err(code) = write_artifact(&graph, artifact, out) {
            return code;
        }
    }
    EXIT_OK
}

fn write_artifact(graph: &Graph, artifact: &Artifact, out: &Path) -> Result<(), i32> {
    let Some(node) = graph.node(artifact.node) else {
        return Ok(());
    };
    let path = out.join(artifact::file_name(node));
    if !artifact.is_found() {
        println!("{}  (404, not written)", path.display());
        return Ok(());
    }
    fs::write(&path, &artifact.body).map_err(|e| {
        eprintln!("Error: failed to write '{}': {}", path.display(), e);
        EXIT_INPUT
    })?;
    let slow = if artifact.slow { "  slow" } else { "" };
    println!("{}  {}{}", path.display(), artifact.content_type(), slow);
    Ok(())
}

fn read_trace(path: Option<&Path>) -> io::Result<Vec<String>> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect()),
        None => io::stdin().lock().lines().collect(),
    }
}

fn exit_code_for(verdict: &Verdict) -> i32 {
    match verdict {
        Verdict::Ok => EXIT_OK,
        Verdict::Fail { .. } => EXIT_FAIL,
        Verdict::Error { .. } => EXIT_ERROR,
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = OK, 1 = FAIL, 2 = ERROR,
/// 3 = invalid graph, protocol violation or I/O error.
fn run_check(text: &str, trace: Option<&Path>, check_errors: bool, json: bool) -> i32 {
    let graph = match parse_graph(text) {
        Ok(graph) => graph,
        Err(code) => return code,
    };
    let lines = match read_trace(trace) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Error: failed to read trace: {}", e);
            return EXIT_INPUT;
        }
    };

    let mut run = TestRun::new(graph, OracleConfig { check_errors });
    let code = match run.feed(&lines) {
        Ok(verdict) => exit_code_for(verdict),
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };

    let report = run.report();
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return EXIT_INPUT;
            }
        }
    } else if code == EXIT_OK {
        println!("OK");
    } else {
        println!("{}", report);
    }
    code
}
