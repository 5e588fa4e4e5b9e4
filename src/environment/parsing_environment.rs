//! Aggregates every storage plus the current call context and step index,
//! and fans lifecycle transitions out to each storage in a fixed order.

use crate::environment::call_context::{CallContext, CallContextArena};
use crate::hexstring::HexString;
use crate::ids::CallContextId;
use crate::step_index::StepIndex;
use crate::storage::{
    AddressKeyStorage, Balances, ContextSpecificStorage, LastExecutedSubContextStorage, Memory,
    RevertableStorage, Stack,
};

/// The post-state of the *next* trace event, used as an oracle by DSL nodes
/// that cannot cheaply recompute a result (e.g. arithmetic opcodes).
#[derive(Clone, Debug, Default)]
pub struct InstructionOutputOracle {
    /// Top-first, unlike the raw trace JSON (which lists top last).
    pub stack: Vec<HexString>,
    pub memory: HexString,
    pub depth: Option<usize>,
}

pub struct ParsingEnvironment {
    pub call_contexts: CallContextArena,
    pub current_call_context: CallContextId,
    pub current_step_index: StepIndex,

    stack_storage: ContextSpecificStorage<Stack>,
    memory_storage: ContextSpecificStorage<Memory>,
    balances_storage: RevertableStorage<Balances>,
    persistent_storage: RevertableStorage<AddressKeyStorage>,
    transient_storage: RevertableStorage<AddressKeyStorage>,
    last_executed_sub_context: LastExecutedSubContextStorage,
}

impl ParsingEnvironment {
    pub fn new(mut call_contexts: CallContextArena, root: CallContext) -> Self {
        let root_id = call_contexts.push(root);
        ParsingEnvironment {
            call_contexts,
            current_call_context: root_id,
            current_step_index: 0,
            stack_storage: ContextSpecificStorage::new(),
            memory_storage: ContextSpecificStorage::new(),
            balances_storage: RevertableStorage::new(),
            persistent_storage: RevertableStorage::new(),
            transient_storage: RevertableStorage::new(),
            last_executed_sub_context: LastExecutedSubContextStorage::new(),
        }
    }

    pub fn current_call_context(&self) -> &CallContext {
        self.call_contexts.get(self.current_call_context)
    }

    pub fn current_call_context_mut(&mut self) -> &mut CallContext {
        self.call_contexts.get_mut(self.current_call_context)
    }

    pub fn stack(&self) -> &Stack {
        self.stack_storage.current()
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        self.stack_storage.current_mut()
    }

    pub fn memory(&self) -> &Memory {
        self.memory_storage.current()
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        self.memory_storage.current_mut()
    }

    pub fn balances(&self) -> &Balances {
        self.balances_storage.current()
    }

    pub fn balances_mut(&mut self) -> &mut Balances {
        self.balances_storage.current_mut()
    }

    pub fn persistent_storage(&self) -> &AddressKeyStorage {
        self.persistent_storage.current()
    }

    pub fn persistent_storage_mut(&mut self) -> &mut AddressKeyStorage {
        self.persistent_storage.current_mut()
    }

    pub fn transient_storage(&self) -> &AddressKeyStorage {
        self.transient_storage.current()
    }

    pub fn transient_storage_mut(&mut self) -> &mut AddressKeyStorage {
        self.transient_storage.current_mut()
    }

    pub fn last_executed_sub_context(&self) -> Option<CallContextId> {
        self.last_executed_sub_context.current()
    }

    /// A new call context has just been entered. Fans out to every storage,
    /// then switches `current_call_context`.
    pub fn on_call_enter(&mut self, next_call_context: CallContextId) {
        self.last_executed_sub_context.on_call_enter();
        self.stack_storage.on_call_enter();
        self.memory_storage.on_call_enter();
        self.balances_storage.on_call_enter();
        self.persistent_storage.on_call_enter();
        self.transient_storage.on_call_enter();
        self.current_call_context = next_call_context;
    }

    /// The current call context halted normally (STOP/RETURN/SELFDESTRUCT).
    /// Commits balances/persistent/transient, discards stack/memory.
    pub fn on_call_exit(&mut self, next_call_context: CallContextId) {
        let exited = self.current_call_context;
        self.last_executed_sub_context.on_call_exit(exited);
        self.stack_storage.on_call_exit();
        self.memory_storage.on_call_exit();
        self.balances_storage.on_call_exit();
        self.persistent_storage.on_call_exit();
        self.transient_storage.on_call_exit();
        self.current_call_context = next_call_context;
    }

    /// The current call context reverted or halted exceptionally. Rolls back
    /// balances/persistent/transient to their pre-call snapshot.
    pub fn on_revert(&mut self, next_call_context: CallContextId) {
        let exited = self.current_call_context;
        self.last_executed_sub_context.on_revert(exited);
        self.stack_storage.on_revert();
        self.memory_storage.on_revert();
        self.balances_storage.on_revert();
        self.persistent_storage.on_revert();
        self.transient_storage.on_revert();
        self.current_call_context = next_call_context;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_group::TaggedByteGroup;

    fn addr(s: &str) -> HexString {
        HexString::new(s).unwrap()
    }

    fn make_env() -> ParsingEnvironment {
        let root = CallContext::root(addr("0x01"), addr("0x02"), TaggedByteGroup::new(), TaggedByteGroup::new());
        ParsingEnvironment::new(CallContextArena::new(), root)
    }

    #[test]
    fn fresh_stack_and_memory_on_call_enter() {
        let mut env = make_env();
        env.stack_mut().push(TaggedByteGroup::from_hexstring(&addr("0x01").as_size(32), 0)).unwrap();

        let child = env.call_contexts.push(CallContext::child(
            env.current_call_context,
            1,
            crate::ids::InstructionId(0),
            addr("0x02"),
            addr("0x03"),
            addr("0x03"),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
            false,
        ));
        env.on_call_enter(child);

        assert_eq!(env.stack().size(), 0);
    }

    #[test]
    fn balances_roll_back_on_revert() {
        let mut env = make_env();
        let root = env.current_call_context;
        env.balances_mut().modified_at_step_index(&addr("0xaa"), 1);

        let child = env.call_contexts.push(CallContext::child(
            root,
            1,
            crate::ids::InstructionId(0),
            addr("0x02"),
            addr("0x03"),
            addr("0x03"),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
            false,
        ));
        env.on_call_enter(child);
        env.balances_mut().modified_at_step_index(&addr("0xaa"), 5);
        env.on_revert(root);

        assert_eq!(env.balances().last_modified_at_step_index(&addr("0xaa")), 1);
    }
}
