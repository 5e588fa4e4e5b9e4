//! Reconstructs EVM execution state and per-byte information flow from
//! EIP-3155 execution traces.
//!
//! A trace is never re-executed as real bytecode. Instead [`trace_evm::TraceEVM`]
//! walks each event and uses the *next* event's reported stack/memory as an
//! oracle for whatever the current opcode cannot cheaply recompute itself
//! (see [`environment::parsing_environment::InstructionOutputOracle`]). Every
//! byte produced along the way is tagged with the step that produced it
//! ([`byte_group`]), which [`graph::FlowGraph`] later turns into a
//! step-to-step dependency graph.

pub mod byte_group;
pub mod call_context_manager;
pub mod environment;
pub mod error;
pub mod events;
pub mod flow;
pub mod graph;
pub mod hexstring;
pub mod ids;
pub mod instructions;
pub mod metadata;
pub mod signatures;
pub mod step_index;
pub mod storage;
pub mod storage_io;
pub mod trace_evm;

pub use error::Error;
