//! What a single instruction read and wrote: the atomic unit this whole
//! crate is built to produce, one per executed step.

use crate::storage_io::{StorageAccesses, StorageWrites};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flow {
    pub accesses: StorageAccesses,
    pub writes: StorageWrites,
}

impl Flow {
    pub fn new(accesses: StorageAccesses, writes: StorageWrites) -> Self {
        Flow { accesses, writes }
    }

    /// Merges a sequence of flows in evaluation order, concatenating all
    /// access/write lists (first-non-empty wins for calldata/return_data).
    pub fn merge(parts: impl IntoIterator<Item = Flow>) -> Flow {
        let mut accesses = Vec::new();
        let mut writes = Vec::new();
        for part in parts {
            accesses.push(part.accesses);
            writes.push(part.writes);
        }
        Flow { accesses: StorageAccesses::merge(accesses), writes: StorageWrites::merge(writes) }
    }
}
