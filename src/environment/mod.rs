pub mod call_context;
pub mod parsing_environment;

pub use call_context::{CallContext, CallContextArena, HaltType};
pub use parsing_environment::{InstructionOutputOracle, ParsingEnvironment};
