pub mod dsl;
pub mod spec;

pub use dsl::{eval, Node};
pub use spec::Flow;
