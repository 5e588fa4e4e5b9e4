//! CLI entry point: loads a trace and its transaction metadata, drives the
//! trace through [`flow_mapping::trace_evm::TraceEVM`], and prints the call
//! tree it walked plus the resulting information-flow graph's size.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use flow_mapping::byte_group::TaggedByteGroup;
use flow_mapping::call_context_manager::build_call_tree;
use flow_mapping::environment::CallContext;
use flow_mapping::events::parse_trace;
use flow_mapping::graph::FlowGraph;
use flow_mapping::metadata::load_victim_transaction;
use flow_mapping::step_index::PRESTATE;
use flow_mapping::trace_evm::TraceEVM;

/// Reconstructs EVM state and information-flow dependencies from an
/// EIP-3155 execution trace.
#[derive(Parser, Debug)]
#[command(name = "flow-mapping", version, about)]
struct Cli {
    /// Path to a line-delimited EIP-3155 execution trace.
    #[arg(long)]
    trace: PathBuf,

    /// Path to the transaction metadata file (transactions_order/transactions).
    #[arg(long)]
    metadata: PathBuf,

    /// Cross-check the simulator's post-state against the trace's own after
    /// every step; aborts on the first mismatch.
    #[arg(long)]
    verify: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("could not read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error(transparent)]
    FlowMapping(#[from] flow_mapping::Error),
}

fn read_to_string(path: &PathBuf) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|source| CliError::Io { path: path.display().to_string(), source })
}

fn open(path: &PathBuf) -> Result<File, CliError> {
    File::open(path).map_err(|source| CliError::Io { path: path.display().to_string(), source })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "flow-mapping failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let metadata_contents = read_to_string(&cli.metadata)?;
    let tx = load_victim_transaction(&metadata_contents)?;

    println!("Parsing transaction {} from {} to {}", tx.hash, tx.from, tx.to);

    let trace_file = open(&cli.trace)?;
    let events = parse_trace(BufReader::new(trace_file))?;

    let root = CallContext::root(
        tx.from.clone(),
        tx.to.clone(),
        TaggedByteGroup::from_hexstring(&tx.input, PRESTATE),
        TaggedByteGroup::from_hexstring(&tx.value, PRESTATE),
    );

    let mut evm = TraceEVM::new(root, cli.verify);
    evm.run(&events)?;

    println!("Parsed {} instructions", evm.instructions.len());

    let tree = build_call_tree(evm.root_call_context(), &evm.instructions, &evm.env.call_contexts);
    println!("Call Tree");
    print!("{}", tree.render(&evm.env.call_contexts));

    let graph = FlowGraph::build(&evm.instructions);
    println!(
        "Information-flow graph: {} nodes, {} edges",
        graph.nodes().count(),
        graph.edges().count()
    );

    Ok(())
}
