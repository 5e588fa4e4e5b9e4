//! A single call frame: who is calling, whose storage is in effect, what
//! calldata it was given. Stored in an append-only arena ([`CallContextArena`])
//! and referenced by stable [`CallContextId`]s so frames can point at their
//! parent without a cyclic reference.

use crate::byte_group::TaggedByteGroup;
use crate::hexstring::HexString;
use crate::ids::{CallContextId, InstructionId};

/// How a call context was exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltType {
    /// STOP, RETURN, REVERT or SELFDESTRUCT.
    Normal,
    /// The context's depth dropped without one of the halt opcodes above -
    /// an implicit abort (e.g. out of gas).
    Exceptional,
}

#[derive(Clone, Debug)]
pub struct CallContext {
    pub parent: Option<CallContextId>,
    pub initiating_instruction: Option<InstructionId>,
    pub calldata: TaggedByteGroup,
    pub value: TaggedByteGroup,
    pub depth: usize,
    pub msg_sender: HexString,
    pub code_address: HexString,
    pub storage_address: HexString,
    pub return_data: TaggedByteGroup,
    pub reverted: bool,
    pub halt_type: Option<HaltType>,
    pub is_contract_initialization: bool,
}

impl CallContext {
    /// The root context of a transaction: no parent, depth 1.
    pub fn root(
        msg_sender: HexString,
        code_address: HexString,
        calldata: TaggedByteGroup,
        value: TaggedByteGroup,
    ) -> Self {
        CallContext {
            parent: None,
            initiating_instruction: None,
            calldata,
            value,
            depth: 1,
            msg_sender: msg_sender.as_address(),
            code_address: code_address.as_address(),
            storage_address: code_address.as_address(),
            return_data: TaggedByteGroup::new(),
            reverted: false,
            halt_type: None,
            is_contract_initialization: false,
        }
    }

    /// A child context entered by a CALL/CREATE-family instruction.
    #[allow(clippy::too_many_arguments)]
    pub fn child(
        parent: CallContextId,
        parent_depth: usize,
        initiating_instruction: InstructionId,
        msg_sender: HexString,
        code_address: HexString,
        storage_address: HexString,
        calldata: TaggedByteGroup,
        value: TaggedByteGroup,
        is_contract_initialization: bool,
    ) -> Self {
        CallContext {
            parent: Some(parent),
            initiating_instruction: Some(initiating_instruction),
            calldata,
            value,
            depth: parent_depth + 1,
            msg_sender: msg_sender.as_address(),
            code_address: code_address.as_address(),
            storage_address: storage_address.as_address(),
            return_data: TaggedByteGroup::new(),
            reverted: false,
            halt_type: None,
            is_contract_initialization,
        }
    }
}

/// Append-only storage for call contexts, referenced elsewhere by stable
/// [`CallContextId`]s rather than by shared/weak references.
#[derive(Clone, Debug, Default)]
pub struct CallContextArena {
    contexts: Vec<CallContext>,
}

impl CallContextArena {
    pub fn new() -> Self {
        CallContextArena { contexts: Vec::new() }
    }

    pub fn push(&mut self, context: CallContext) -> CallContextId {
        self.contexts.push(context);
        CallContextId(self.contexts.len() - 1)
    }

    pub fn get(&self, id: CallContextId) -> &CallContext {
        &self.contexts[id.0]
    }

    pub fn get_mut(&mut self, id: CallContextId) -> &mut CallContext {
        &mut self.contexts[id.0]
    }

    /// Walks `parent` links up to the context with no parent.
    pub fn get_root(&self, id: CallContextId) -> CallContextId {
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            current = parent;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> HexString {
        HexString::new(s).unwrap()
    }

    #[test]
    fn root_has_no_parent_and_depth_one() {
        let root = CallContext::root(addr("0x01"), addr("0x02"), TaggedByteGroup::new(), TaggedByteGroup::new());
        assert_eq!(root.parent, None);
        assert_eq!(root.depth, 1);
        assert_eq!(root.code_address, root.storage_address);
    }

    #[test]
    fn get_root_walks_up_to_the_top() {
        let mut arena = CallContextArena::new();
        let root = arena.push(CallContext::root(addr("0x01"), addr("0x02"), TaggedByteGroup::new(), TaggedByteGroup::new()));
        let child = arena.push(CallContext::child(
            root,
            1,
            InstructionId(0),
            addr("0x02"),
            addr("0x03"),
            addr("0x03"),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
            false,
        ));
        let grandchild = arena.push(CallContext::child(
            child,
            2,
            InstructionId(1),
            addr("0x03"),
            addr("0x04"),
            addr("0x04"),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
            false,
        ));

        assert_eq!(arena.get_root(grandchild), root);
    }
}
