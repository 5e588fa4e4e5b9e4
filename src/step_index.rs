//! Step indexes: the provenance currency of this crate.
//!
//! Every tagged byte, balance modification and call-context snapshot is keyed
//! by the step index of the instruction that produced it. Two sentinel values
//! stand in for "before the transaction started" and "test-only filler data".

/// A step index, or one of the reserved sentinels below.
///
/// Real step indexes are non-negative and increase monotonically as the
/// driver advances. The sentinels are negative so they can never collide
/// with a real step.
pub type StepIndex = i64;

/// Bytes that were already present before the transaction executed (prestate).
pub const PRESTATE: StepIndex = -1;

/// Bytes synthesized for tests that don't care about provenance.
pub const TEST_DEFAULT: StepIndex = -2;

/// True for the two reserved sentinels, false for any real step index.
pub fn is_sentinel(step_index: StepIndex) -> bool {
    step_index < 0
}
