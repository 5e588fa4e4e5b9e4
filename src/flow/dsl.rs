//! The information-flow DSL: a small tree of node kinds, built once per
//! opcode and evaluated against the [`ParsingEnvironment`] and the next
//! step's oracle to produce a [`Flow`].
//!
//! Most nodes only *read* the environment and queue up writes for the driver
//! to apply later, in the fixed order described in the instruction catalogue
//! module. `BalanceTransfer` and `Selfdestruct` are the exception: they
//! update the balances table immediately, since a later node in the same
//! instruction may need to observe it.

use crate::byte_group::TaggedByteGroup;
use crate::environment::parsing_environment::{InstructionOutputOracle, ParsingEnvironment};
use crate::hexstring::HexString;
use crate::step_index::{StepIndex, PRESTATE};
use crate::storage_io::{
    BalanceAccess, BalanceTransferWrite, CalldataAccess, CalldataWrite, CallvalueAccess,
    MemoryAccess, MemoryWrite, PersistentStorageAccess, PersistentStorageWrite, ReturnDataAccess,
    ReturnWrite, SelfdestructWrite, StackAccess, StackPop, StackPush, StackSet,
    TransientStorageAccess, TransientStorageWrite,
};

use super::spec::Flow;

#[derive(Clone, Debug)]
pub enum Node {
    Const(HexString),
    StackArg(usize),
    StackPeek(usize),
    OracleStackPeek(usize),
    OracleMemRangePeek(Box<Node>, Box<Node>),
    MemRange(Box<Node>, Box<Node>),
    MemSize,
    CalldataRange(Box<Node>, Box<Node>),
    CalldataSize,
    Callvalue,
    ReturnDataRange(Box<Node>, Box<Node>),
    ReturnDataSize,
    CurrentStorageAddress,
    BalanceOf(Box<Node>),
    PersistentStorageGet(Box<Node>),
    TransientStorageGet(Box<Node>),
    ToSize(Box<Node>, usize),

    StackPushNode(Box<Node>),
    StackSetNode(usize, Box<Node>),
    MemWrite(Box<Node>, Box<Node>),
    CalldataWriteNode(Box<Node>),
    ReturnDataWriteNode(Box<Node>),
    PersistentStorageSet(Box<Node>, Box<Node>),
    TransientStorageSet(Box<Node>, Box<Node>),
    BalanceTransfer(Box<Node>, Box<Node>, Box<Node>),
    Selfdestruct(Box<Node>, Box<Node>),

    Combine(Vec<Node>),
    Noop,
}

pub fn const_hex(hex: &str) -> Node {
    Node::Const(HexString::new(hex).expect("literal opcode constant must be valid hex"))
}
pub fn const_int(value: u64) -> Node {
    Node::Const(HexString::from_int(value))
}
pub fn stack_arg(index: usize) -> Node {
    Node::StackArg(index)
}
pub fn stack_peek(index: usize) -> Node {
    Node::StackPeek(index)
}
pub fn oracle_stack_peek(index: usize) -> Node {
    Node::OracleStackPeek(index)
}
pub fn oracle_mem_range_peek(offset: Node, size: Node) -> Node {
    Node::OracleMemRangePeek(Box::new(offset), Box::new(size))
}
pub fn mem_range(offset: Node, size: Node) -> Node {
    Node::MemRange(Box::new(offset), Box::new(size))
}
pub fn mem_size() -> Node {
    Node::MemSize
}
pub fn calldata_range(offset: Node, size: Node) -> Node {
    Node::CalldataRange(Box::new(offset), Box::new(size))
}
pub fn calldata_size() -> Node {
    Node::CalldataSize
}
pub fn callvalue() -> Node {
    Node::Callvalue
}
pub fn return_data_range(offset: Node, size: Node) -> Node {
    Node::ReturnDataRange(Box::new(offset), Box::new(size))
}
pub fn return_data_size() -> Node {
    Node::ReturnDataSize
}
pub fn current_storage_address() -> Node {
    Node::CurrentStorageAddress
}
pub fn balance_of(address: Node) -> Node {
    Node::BalanceOf(Box::new(address))
}
pub fn persistent_storage_get(key: Node) -> Node {
    Node::PersistentStorageGet(Box::new(key))
}
pub fn transient_storage_get(key: Node) -> Node {
    Node::TransientStorageGet(Box::new(key))
}
pub fn to_size(node: Node, size: usize) -> Node {
    Node::ToSize(Box::new(node), size)
}
pub fn stack_push(node: Node) -> Node {
    Node::StackPushNode(Box::new(node))
}
pub fn stack_set(index: usize, node: Node) -> Node {
    Node::StackSetNode(index, Box::new(node))
}
pub fn mem_write(offset: Node, value: Node) -> Node {
    Node::MemWrite(Box::new(offset), Box::new(value))
}
pub fn calldata_write(node: Node) -> Node {
    Node::CalldataWriteNode(Box::new(node))
}
pub fn return_data_write(node: Node) -> Node {
    Node::ReturnDataWriteNode(Box::new(node))
}
pub fn persistent_storage_set(key: Node, value: Node) -> Node {
    Node::PersistentStorageSet(Box::new(key), Box::new(value))
}
pub fn transient_storage_set(key: Node, value: Node) -> Node {
    Node::TransientStorageSet(Box::new(key), Box::new(value))
}
pub fn balance_transfer(from: Node, to: Node, value: Node) -> Node {
    Node::BalanceTransfer(Box::new(from), Box::new(to), Box::new(value))
}
pub fn selfdestruct(from: Node, to: Node) -> Node {
    Node::Selfdestruct(Box::new(from), Box::new(to))
}
pub fn combine(nodes: Vec<Node>) -> Node {
    Node::Combine(nodes)
}
pub fn noop() -> Node {
    Node::Noop
}

fn tagged_const(hex: &HexString, step: StepIndex) -> TaggedByteGroup {
    TaggedByteGroup::from_hexstring(hex, step)
}

fn as_offset(group: &TaggedByteGroup) -> usize {
    group.get_hexstring().as_usize()
}

/// Evaluates a node against `env`/`oracle`, returning the flow it produced
/// plus its result (absent for writing-only nodes and combinators).
pub fn eval(
    node: &Node,
    env: &mut ParsingEnvironment,
    oracle: &InstructionOutputOracle,
) -> (Flow, Option<TaggedByteGroup>) {
    let step = env.current_step_index;
    match node {
        Node::Const(hex) => (Flow::default(), Some(tagged_const(hex, step))),

        Node::StackArg(index) => {
            let value = env.stack().peek(*index);
            let mut flow = Flow::default();
            flow.accesses.stack.push(StackAccess { index: *index, value: value.clone() });
            flow.writes.stack_pops.push(StackPop);
            (flow, Some(value))
        }

        Node::StackPeek(index) => {
            let value = env.stack().peek(*index);
            let mut flow = Flow::default();
            flow.accesses.stack.push(StackAccess { index: *index, value: value.clone() });
            (flow, Some(value))
        }

        Node::OracleStackPeek(index) => {
            let hex = oracle.stack.get(*index).cloned().unwrap_or_else(|| HexString::zeros(32));
            (Flow::default(), Some(tagged_const(&hex.as_size(32), step)))
        }

        Node::OracleMemRangePeek(offset_node, size_node) => {
            let (offset_flow, offset_result) = eval(offset_node, env, oracle);
            let (size_flow, size_result) = eval(size_node, env, oracle);
            let offset = as_offset(&offset_result.expect("oracle_mem_range_peek needs an offset"));
            let size = as_offset(&size_result.expect("oracle_mem_range_peek needs a size"));

            let oracle_bytes = oracle.memory.as_bytes();
            let mut bytes = Vec::with_capacity(size);
            for i in 0..size {
                let value = oracle_bytes.get(offset + i).copied().unwrap_or(0);
                bytes.push(crate::byte_group::TaggedByte { value, created_at_step_index: step });
            }
            let result = TaggedByteGroup::from_bytes(bytes);
            (Flow::merge([offset_flow, size_flow]), Some(result))
        }

        Node::MemRange(offset_node, size_node) => {
            let (offset_flow, offset_result) = eval(offset_node, env, oracle);
            let (size_flow, size_result) = eval(size_node, env, oracle);
            let offset = as_offset(&offset_result.expect("mem_range needs an offset"));
            let size = as_offset(&size_result.expect("mem_range needs a size"));

            let value = env.memory().get(offset, size, step);
            let mut flow = Flow::merge([offset_flow, size_flow]);
            flow.accesses.memory.push(MemoryAccess { offset, value: value.clone() });
            (flow, Some(value))
        }

        Node::MemSize => {
            let size = env.memory().size();
            let result = tagged_const(&HexString::from_int(size as u64).as_size(32), step);
            let access_offset = size.saturating_sub(32);
            let access_value = env.memory().get(access_offset, 32.min(size), step);
            let mut flow = Flow::default();
            flow.accesses.memory.push(MemoryAccess { offset: access_offset, value: access_value });
            (flow, Some(result))
        }

        Node::CalldataRange(offset_node, size_node) => {
            let (offset_flow, offset_result) = eval(offset_node, env, oracle);
            let (size_flow, size_result) = eval(size_node, env, oracle);
            let offset = as_offset(&offset_result.expect("calldata_range needs an offset"));
            let size = as_offset(&size_result.expect("calldata_range needs a size"));

            let calldata = env.current_call_context().calldata.clone();
            let mut bytes = Vec::with_capacity(size);
            for i in 0..size {
                let index = offset + i;
                if index < calldata.len() {
                    bytes.push(calldata.bytes()[index]);
                } else {
                    bytes.push(crate::byte_group::TaggedByte { value: 0, created_at_step_index: step });
                }
            }
            let value = TaggedByteGroup::from_bytes(bytes);
            let mut flow = Flow::merge([offset_flow, size_flow]);
            flow.accesses.calldata.push(CalldataAccess { offset, value: value.clone() });
            (flow, Some(value))
        }

        Node::CalldataSize => {
            let size = env.current_call_context().calldata.len();
            let result = tagged_const(&HexString::from_int(size as u64).as_size(32), step);
            let mut flow = Flow::default();
            flow.accesses.calldata.push(CalldataAccess { offset: 0, value: TaggedByteGroup::new() });
            (flow, Some(result))
        }

        Node::Callvalue => {
            let value = env.current_call_context().value.clone();
            let mut flow = Flow::default();
            flow.accesses.callvalue.push(CallvalueAccess { value: value.clone() });
            (flow, Some(value))
        }

        Node::ReturnDataRange(offset_node, size_node) => {
            let (offset_flow, offset_result) = eval(offset_node, env, oracle);
            let (size_flow, size_result) = eval(size_node, env, oracle);
            let offset = as_offset(&offset_result.expect("return_data_range needs an offset"));
            let size = as_offset(&size_result.expect("return_data_range needs a size"));
            let mut flow = Flow::merge([offset_flow, size_flow]);

            if size == 0 {
                return (flow, Some(TaggedByteGroup::new()));
            }

            let return_data = env
                .last_executed_sub_context()
                .map(|id| env.call_contexts.get(id).return_data.clone())
                .unwrap_or_default();

            let value = if offset + size > return_data.len() {
                TaggedByteGroup::new()
            } else {
                return_data.slice(offset, offset + size)
            };
            flow.accesses.return_data = Some(ReturnDataAccess { offset, size, value: value.clone() });
            (flow, Some(value))
        }

        Node::ReturnDataSize => {
            let mut flow = Flow::default();
            match env.last_executed_sub_context() {
                Some(id) => {
                    let return_data = env.call_contexts.get(id).return_data.clone();
                    let size = return_data.len();
                    let result = tagged_const(&HexString::from_int(size as u64).as_size(32), step);
                    flow.accesses.return_data = Some(ReturnDataAccess { offset: 0, size, value: return_data });
                    (flow, Some(result))
                }
                None => {
                    let result = tagged_const(&HexString::zeros(32), step);
                    flow.accesses.return_data =
                        Some(ReturnDataAccess { offset: 0, size: 0, value: TaggedByteGroup::new() });
                    (flow, Some(result))
                }
            }
        }

        Node::CurrentStorageAddress => {
            let address = env.current_call_context().storage_address.as_size(32);
            (Flow::default(), Some(tagged_const(&address, step)))
        }

        Node::BalanceOf(address_node) => {
            let (address_flow, address_result) = eval(address_node, env, oracle);
            let address = address_result.expect("balance_of needs an address").tail(20);
            let address_hex = address.get_hexstring();
            let last_modified = env.balances().last_modified_at_step_index(&address_hex);

            let mut flow = address_flow;
            flow.accesses.balance.push(BalanceAccess { address, last_modified_step_index: last_modified });
            (flow, Some(TaggedByteGroup::new()))
        }

        Node::PersistentStorageGet(key_node) => {
            let (key_flow, key_result) = eval(key_node, env, oracle);
            let key = key_result.expect("persistent_storage_get needs a key");
            let key_hex = key.get_hexstring().as_size(32);
            let storage_address = env.current_call_context().storage_address.clone();

            let value = if env.persistent_storage().knows_key(&storage_address, &key_hex) {
                env.persistent_storage().get(&storage_address, &key_hex).expect("checked above")
            } else {
                let oracle_value = oracle.stack.first().cloned().unwrap_or_else(|| HexString::zeros(32));
                tagged_const(&oracle_value.as_size(32), PRESTATE)
            };

            let mut flow = key_flow;
            flow.accesses.persistent_storage.push(PersistentStorageAccess {
                address: tagged_const(&storage_address, step),
                key,
                value: value.clone(),
            });
            (flow, Some(value))
        }

        Node::TransientStorageGet(key_node) => {
            let (key_flow, key_result) = eval(key_node, env, oracle);
            let key = key_result.expect("transient_storage_get needs a key");
            let key_hex = key.get_hexstring().as_size(32);
            let storage_address = env.current_call_context().storage_address.clone();

            let value = if env.transient_storage().knows_key(&storage_address, &key_hex) {
                env.transient_storage().get(&storage_address, &key_hex).expect("checked above")
            } else {
                tagged_const(&HexString::zeros(32), step)
            };

            let mut flow = key_flow;
            flow.accesses.transient_storage.push(TransientStorageAccess {
                address: tagged_const(&storage_address, step),
                key,
                value: value.clone(),
            });
            (flow, Some(value))
        }

        Node::ToSize(inner_node, size) => {
            let (flow, result) = eval(inner_node, env, oracle);
            let resized = result.expect("to_size needs a value").to_size(*size, step);
            (flow, Some(resized))
        }

        Node::StackPushNode(value_node) => {
            let (flow, result) = eval(value_node, env, oracle);
            let mut flow = flow;
            flow.writes.stack_pushes.push(StackPush { value: result.expect("stack_push needs a value") });
            (flow, None)
        }

        Node::StackSetNode(index, value_node) => {
            let (flow, result) = eval(value_node, env, oracle);
            let mut flow = flow;
            flow.writes
                .stack_sets
                .push(StackSet { index: *index, value: result.expect("stack_set needs a value") });
            (flow, None)
        }

        Node::MemWrite(offset_node, value_node) => {
            let (offset_flow, offset_result) = eval(offset_node, env, oracle);
            let (value_flow, value_result) = eval(value_node, env, oracle);
            let offset = as_offset(&offset_result.expect("mem_write needs an offset"));
            let mut flow = Flow::merge([offset_flow, value_flow]);
            flow.writes
                .memory
                .push(MemoryWrite { offset, value: value_result.expect("mem_write needs a value") });
            (flow, None)
        }

        Node::CalldataWriteNode(value_node) => {
            let (flow, result) = eval(value_node, env, oracle);
            let mut flow = flow;
            flow.writes.calldata = Some(CalldataWrite { value: result.expect("calldata_write needs a value") });
            (flow, None)
        }

        Node::ReturnDataWriteNode(value_node) => {
            let (flow, result) = eval(value_node, env, oracle);
            let mut flow = flow;
            flow.writes.return_data =
                Some(ReturnWrite { value: result.expect("return_data_write needs a value") });
            (flow, None)
        }

        Node::PersistentStorageSet(key_node, value_node) => {
            let (key_flow, key_result) = eval(key_node, env, oracle);
            let (value_flow, value_result) = eval(value_node, env, oracle);
            let storage_address = env.current_call_context().storage_address.clone();
            let mut flow = Flow::merge([key_flow, value_flow]);
            flow.writes.persistent_storage.push(PersistentStorageWrite {
                address: tagged_const(&storage_address, step),
                key: key_result.expect("persistent_storage_set needs a key"),
                value: value_result.expect("persistent_storage_set needs a value"),
            });
            (flow, None)
        }

        Node::TransientStorageSet(key_node, value_node) => {
            let (key_flow, key_result) = eval(key_node, env, oracle);
            let (value_flow, value_result) = eval(value_node, env, oracle);
            let storage_address = env.current_call_context().storage_address.clone();
            let mut flow = Flow::merge([key_flow, value_flow]);
            flow.writes.transient_storage.push(TransientStorageWrite {
                address: tagged_const(&storage_address, step),
                key: key_result.expect("transient_storage_set needs a key"),
                value: value_result.expect("transient_storage_set needs a value"),
            });
            (flow, None)
        }

        Node::BalanceTransfer(from_node, to_node, value_node) => {
            let (from_flow, from_result) = eval(from_node, env, oracle);
            let (to_flow, to_result) = eval(to_node, env, oracle);
            let (value_flow, value_result) = eval(value_node, env, oracle);
            let from_address = from_result.expect("balance_transfer needs a from address").tail(20);
            let to_address = to_result.expect("balance_transfer needs a to address").tail(20);
            let from_hex = from_address.get_hexstring();
            let to_hex = to_address.get_hexstring();

            let last_modified = env.balances().last_modified_at_step_index(&from_hex);
            env.balances_mut().modified_at_step_index(&to_hex, step);

            let mut flow = Flow::merge([from_flow, to_flow, value_flow]);
            flow.accesses.balance.push(BalanceAccess { address: from_address.clone(), last_modified_step_index: last_modified });
            flow.writes.balance_transfers.push(BalanceTransferWrite {
                address_from: from_address,
                address_to: to_address,
                value: value_result.expect("balance_transfer needs a value"),
            });
            (flow, None)
        }

        Node::Selfdestruct(from_node, to_node) => {
            let (from_flow, from_result) = eval(from_node, env, oracle);
            let (to_flow, to_result) = eval(to_node, env, oracle);
            let from_address = from_result.expect("selfdestruct needs a from address").tail(20);
            let to_address = to_result.expect("selfdestruct needs a to address").tail(20);
            let from_hex = from_address.get_hexstring();
            let to_hex = to_address.get_hexstring();

            let last_modified = env.balances().last_modified_at_step_index(&from_hex);
            env.balances_mut().modified_at_step_index(&to_hex, step);

            let mut flow = Flow::merge([from_flow, to_flow]);
            flow.accesses.balance.push(BalanceAccess { address: from_address.clone(), last_modified_step_index: last_modified });
            flow.writes.selfdestruct.push(SelfdestructWrite { address_from: from_address, address_to: to_address });
            (flow, None)
        }

        Node::Combine(nodes) => {
            let mut flows = Vec::with_capacity(nodes.len());
            for child in nodes {
                let (flow, _) = eval(child, env, oracle);
                flows.push(flow);
            }
            (Flow::merge(flows), None)
        }

        Node::Noop => (Flow::default(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::environment::call_context::CallContext;
    use crate::environment::call_context::CallContextArena;

    fn env_with_stack(values: &[&str]) -> ParsingEnvironment {
        let root = CallContext::root(
            HexString::new("0x01").unwrap(),
            HexString::new("0x02").unwrap(),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
        );
        let mut env = ParsingEnvironment::new(CallContextArena::new(), root);
        for v in values {
            env.stack_mut()
                .push(TaggedByteGroup::from_hexstring(&HexString::new(v).unwrap().as_size(32), 0))
                .unwrap();
        }
        env
    }

    #[test]
    fn stack_arg_reads_and_queues_a_pop() {
        let mut env = env_with_stack(&["0x05"]);
        let oracle = InstructionOutputOracle::default();

        let (flow, result) = eval(&stack_arg(0), &mut env, &oracle);

        assert_eq!(result.unwrap().get_hexstring().as_usize(), 5);
        assert_eq!(flow.accesses.stack.len(), 1);
        assert_eq!(flow.writes.stack_pops.len(), 1);
    }

    #[test]
    fn combine_merges_children_left_to_right() {
        let mut env = env_with_stack(&["0x02", "0x03"]);
        let oracle = InstructionOutputOracle { stack: vec![HexString::from_int(5)], ..Default::default() };

        let node = combine(vec![stack_push(oracle_stack_peek(0)), stack_arg(0), stack_arg(1)]);
        let (flow, _) = eval(&node, &mut env, &oracle);

        assert_eq!(flow.writes.stack_pushes.len(), 1);
        assert_eq!(flow.writes.stack_pops.len(), 2);
        assert_eq!(flow.accesses.stack.len(), 2);
    }

    #[test]
    fn balance_transfer_updates_balances_immediately() {
        let mut env = env_with_stack(&[]);
        env.current_step_index = 7;
        let oracle = InstructionOutputOracle::default();
        let from = const_hex("0x01");
        let to = const_hex("0x02");
        let value = const_hex("0x03");

        let (_, _) = eval(&balance_transfer(from, to, value), &mut env, &oracle);

        assert_eq!(
            env.balances().last_modified_at_step_index(&HexString::new("0x02").unwrap()),
            7
        );
    }
}
