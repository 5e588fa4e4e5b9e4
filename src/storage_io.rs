//! What an instruction read ([`StorageAccesses`]) and what it produced
//! ([`StorageWrites`]), expressed over [`TaggedByteGroup`] values so that
//! every access/write carries full byte-level provenance.

use crate::byte_group::TaggedByteGroup;
use crate::step_index::StepIndex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackAccess {
    pub index: usize,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackSet {
    pub index: usize,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackPush {
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackPop;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryAccess {
    pub offset: usize,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryWrite {
    pub offset: usize,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentStorageAccess {
    pub address: TaggedByteGroup,
    pub key: TaggedByteGroup,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistentStorageWrite {
    pub address: TaggedByteGroup,
    pub key: TaggedByteGroup,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientStorageAccess {
    pub address: TaggedByteGroup,
    pub key: TaggedByteGroup,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientStorageWrite {
    pub address: TaggedByteGroup,
    pub key: TaggedByteGroup,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceAccess {
    pub address: TaggedByteGroup,
    pub last_modified_step_index: StepIndex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceTransferWrite {
    pub address_from: TaggedByteGroup,
    pub address_to: TaggedByteGroup,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelfdestructWrite {
    pub address_from: TaggedByteGroup,
    pub address_to: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalldataAccess {
    pub offset: usize,
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalldataWrite {
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallvalueAccess {
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnWrite {
    pub value: TaggedByteGroup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnDataAccess {
    pub offset: usize,
    pub size: usize,
    pub value: TaggedByteGroup,
}

/// Everything an instruction read, in evaluation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageAccesses {
    pub stack: Vec<StackAccess>,
    pub memory: Vec<MemoryAccess>,
    pub persistent_storage: Vec<PersistentStorageAccess>,
    pub transient_storage: Vec<TransientStorageAccess>,
    pub balance: Vec<BalanceAccess>,
    pub calldata: Vec<CalldataAccess>,
    pub callvalue: Vec<CallvalueAccess>,
    pub return_data: Option<ReturnDataAccess>,
}

impl StorageAccesses {
    pub fn merge(parts: impl IntoIterator<Item = StorageAccesses>) -> StorageAccesses {
        let mut merged = StorageAccesses::default();
        for part in parts {
            merged.stack.extend(part.stack);
            merged.memory.extend(part.memory);
            merged.persistent_storage.extend(part.persistent_storage);
            merged.transient_storage.extend(part.transient_storage);
            merged.balance.extend(part.balance);
            merged.calldata.extend(part.calldata);
            merged.callvalue.extend(part.callvalue);
            merged.return_data = merged.return_data.or(part.return_data);
        }
        merged
    }

    /// One `(producer_step, byte_subgroup)` pair per provenance-contiguous
    /// slice of every access recorded here. Balance accesses contribute a
    /// single dependency with no byte group, since they carry no bytes.
    pub fn get_dependencies(&self) -> Vec<(StepIndex, Option<TaggedByteGroup>)> {
        let mut deps = Vec::new();
        for access in &self.stack {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.memory {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.persistent_storage {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.transient_storage {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.calldata {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.callvalue {
            for group in access.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        for access in &self.balance {
            deps.push((access.last_modified_step_index, None));
        }
        if let Some(return_data) = &self.return_data {
            for group in return_data.value.split_by_dependencies() {
                let step = *group.depends_on_instruction_indexes().iter().next().unwrap();
                deps.push((step, Some(group)));
            }
        }
        deps
    }
}

/// Everything an instruction produced, in application order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageWrites {
    pub stack_pops: Vec<StackPop>,
    pub stack_sets: Vec<StackSet>,
    pub stack_pushes: Vec<StackPush>,
    pub memory: Vec<MemoryWrite>,
    pub calldata: Option<CalldataWrite>,
    pub return_data: Option<ReturnWrite>,
    pub persistent_storage: Vec<PersistentStorageWrite>,
    pub transient_storage: Vec<TransientStorageWrite>,
    pub balance_transfers: Vec<BalanceTransferWrite>,
    pub selfdestruct: Vec<SelfdestructWrite>,
}

impl StorageWrites {
    pub fn merge(parts: impl IntoIterator<Item = StorageWrites>) -> StorageWrites {
        let mut merged = StorageWrites::default();
        for part in parts {
            merged.stack_pops.extend(part.stack_pops);
            merged.stack_sets.extend(part.stack_sets);
            merged.stack_pushes.extend(part.stack_pushes);
            merged.memory.extend(part.memory);
            merged.calldata = merged.calldata.or(part.calldata);
            merged.return_data = merged.return_data.or(part.return_data);
            merged.persistent_storage.extend(part.persistent_storage);
            merged.transient_storage.extend(part.transient_storage);
            merged.balance_transfers.extend(part.balance_transfers);
            merged.selfdestruct.extend(part.selfdestruct);
        }
        merged
    }
}
