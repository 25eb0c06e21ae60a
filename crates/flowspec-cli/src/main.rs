//! Dataflow specification compiler CLI.
//!
//! Provides the `flowspec` binary. `compile` reads a JSON specification,
//! compiles it against the in-memory reference engine with the standard
//! expression library, optionally instantiates subflows, and prints a JSON
//! report of the root scope and the resulting graph.

use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowspec_core::{
    CompileError, DataRoles, DataflowSpec, OperatorId, Parameter, Runtime, RuntimeConfig, ScopeId,
    Subflow,
};
use flowspec_engine::{builtin_transforms, GraphSummary, MemoryEngine};
use flowspec_expr::{ExprCompiler, StandardLibrary};

/// Dataflow specification compiler.
#[derive(Parser)]
#[command(name = "flowspec", about = "Compile dataflow specifications into operator graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a specification and print the resulting graph.
    Compile {
        /// Path to the JSON specification.
        #[arg(short, long)]
        spec: PathBuf,

        /// Instantiate every subflow parameter of operator OP with indices 0..N.
        #[arg(short, long, value_name = "OP=N", value_parser = parse_instantiate)]
        instantiate: Vec<(String, usize)>,

        /// Maximum subflow nesting depth.
        #[arg(long, default_value_t = RuntimeConfig::default().max_subflow_depth)]
        max_subflow_depth: usize,

        /// Print the report on one line.
        #[arg(long)]
        compact: bool,
    },
}

/// Parses `OP=N`.
fn parse_instantiate(arg: &str) -> Result<(String, usize), String> {
    let (op, count) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected OP=N, got '{arg}'"))?;
    if op.is_empty() {
        return Err(format!("missing operator id in '{arg}'"));
    }
    let count = count
        .parse::<usize>()
        .map_err(|e| format!("invalid instance count in '{arg}': {e}"))?;
    Ok((op.to_string(), count))
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("FLOWSPEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            spec,
            instantiate,
            max_subflow_depth,
            compact,
        } => {
            let config = RuntimeConfig { max_subflow_depth };
            let exit_code = run_compile(&spec, &instantiate, config, compact);
            process::exit(exit_code);
        }
    }
}

/// Why a compile run failed, mapped to an exit code.
#[derive(Debug)]
enum Failure {
    Compile(CompileError),
    Usage(String),
    Io(String),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Compile(_) => 1,
            Failure::Usage(_) => 2,
            Failure::Io(_) => 3,
        }
    }
}

/// Execute the compile subcommand.
///
/// Returns exit code: 0 = success, 1 = compile error, 2 = usage error,
/// 3 = I/O or decode error.
fn run_compile(path: &Path, instantiate: &[(String, usize)], config: RuntimeConfig, compact: bool) -> i32 {
    let result = load_spec(path).and_then(|spec| compile_report(&spec, instantiate, config));
    match result {
        Ok(report) => {
            let json = if compact {
                serde_json::to_string(&report)
            } else {
                serde_json::to_string_pretty(&report)
            };
            match json {
                Ok(text) => {
                    println!("{text}");
                    0
                }
                Err(e) => {
                    eprintln!("Error: failed to serialize report: {e}");
                    3
                }
            }
        }
        Err(failure) => {
            match &failure {
                Failure::Compile(e) => eprintln!("Compilation error: {e}"),
                Failure::Usage(msg) => eprintln!("Error: {msg}"),
                Failure::Io(msg) => eprintln!("I/O error: {msg}"),
            }
            failure.exit_code()
        }
    }
}

fn load_spec(path: &Path) -> Result<DataflowSpec, Failure> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Failure::Io(format!("failed to read '{}': {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| Failure::Io(format!("failed to decode '{}': {e}", path.display())))
}

#[derive(Debug, Serialize)]
struct Report {
    scope: ScopeReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    instances: Vec<InstanceReport>,
    graph: GraphSummary,
}

#[derive(Debug, Serialize)]
struct ScopeReport {
    nodes: IndexMap<String, OperatorId>,
    signals: IndexMap<String, OperatorId>,
    scales: IndexMap<String, OperatorId>,
    data: IndexMap<String, DataRoles>,
    root: Option<OperatorId>,
}

#[derive(Debug, Serialize)]
struct InstanceReport {
    operator: String,
    parameter: String,
    index: usize,
    scope: ScopeId,
    item_path: Vec<usize>,
    output: OperatorId,
}

fn compile_report(
    spec: &DataflowSpec,
    instantiate: &[(String, usize)],
    config: RuntimeConfig,
) -> Result<Report, Failure> {
    let mut runtime = Runtime::with_library(
        MemoryEngine::new(),
        builtin_transforms(),
        Rc::new(ExprCompiler),
        Rc::new(StandardLibrary),
    )
    .with_config(config);

    let root = runtime.compile(spec).map_err(Failure::Compile)?;
    tracing::info!(operators = runtime.engine().node_count(), "compiled specification");

    let mut instances = Vec::new();
    for (id, count) in instantiate {
        let op = runtime
            .scopes()
            .get(root, &id.as_str().into())
            .ok_or_else(|| Failure::Usage(format!("--instantiate names unknown operator '{id}'")))?;
        let factories = subflows(&runtime, op);
        if factories.is_empty() {
            return Err(Failure::Usage(format!("operator '{id}' has no subflow parameter")));
        }

        for (parameter, factory) in factories {
            for index in 0..*count {
                let output = factory
                    .instantiate(&mut runtime, index)
                    .map_err(Failure::Compile)?;
                let scope = runtime
                    .scopes()
                    .forks(factory.scope())
                    .last()
                    .copied()
                    .unwrap_or(root);
                instances.push(InstanceReport {
                    operator: id.clone(),
                    parameter: parameter.clone(),
                    index,
                    scope,
                    item_path: runtime.scopes().item_path(scope).to_vec(),
                    output,
                });
            }
        }
    }

    let scopes = runtime.scopes();
    let scope = ScopeReport {
        nodes: scopes
            .local_nodes(root)
            .map(|(id, op)| (id.to_string(), op))
            .collect(),
        signals: scopes.signals(root),
        scales: scopes.scales(root),
        data: scopes
            .datasets(root)
            .into_iter()
            .filter_map(|name| scopes.dataset(root, &name).map(|roles| (name, roles)))
            .collect(),
        root: scopes.root(root),
    };

    Ok(Report {
        scope,
        instances,
        graph: GraphSummary::of(runtime.engine()),
    })
}

/// Subflow factories among the parameters of `op`, in parameter order.
fn subflows(runtime: &Runtime<MemoryEngine>, op: OperatorId) -> Vec<(String, Rc<Subflow>)> {
    let Some(node) = runtime.engine().node(op) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (name, param) in &node.params {
        match param {
            Parameter::Subflow(sub) => out.push((name.clone(), Rc::clone(sub))),
            Parameter::Array(items) => {
                for item in items {
                    if let Parameter::Subflow(sub) = item {
                        out.push((name.clone(), Rc::clone(sub)));
                    }
                }
            }
            _ => {}
        }
    }
    out
}
