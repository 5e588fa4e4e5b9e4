//! Free functions standing in for the "capability interface" the design
//! notes call for: the five `child_*` getters and the two
//! `get_*_return_writes` operations that only CALL/CREATE-family
//! instructions have, without a trait object per instruction.

use sha2::{Digest, Sha256};

use crate::byte_group::{TaggedByte, TaggedByteGroup};
use crate::environment::call_context::CallContext;
use crate::environment::parsing_environment::InstructionOutputOracle;
use crate::hexstring::HexString;
use crate::step_index::StepIndex;
use crate::storage_io::{MemoryWrite, StackPush, StorageWrites};

use super::catalogue::CallKind;
use super::Instruction;

/// Deterministic placeholder for a CREATE/CREATE2 target address. Real
/// address computation (nonce/init-code hashing) is out of scope; only
/// determinism across repeated runs is required. Grounded on the SHA-256
/// convention used by the upstream implementation this crate follows.
pub fn compute_child_address(parent_code_address: &HexString) -> HexString {
    let mut hasher = Sha256::new();
    hasher.update(parent_code_address.with_prefix().as_bytes());
    let hex_digest = hex::encode(hasher.finalize());
    HexString::new(&hex_digest[12..]).expect("sha256 hex digest slice is always valid hex")
}

fn stack_address(instr: &Instruction, index: usize) -> HexString {
    instr.flow.accesses.stack[index].value.get_hexstring().as_address()
}

pub fn child_code_address(instr: &Instruction, parent: &CallContext) -> HexString {
    match instr.call_kind() {
        CallKind::Call | CallKind::StaticCall | CallKind::DelegateCall | CallKind::CallCode => {
            stack_address(instr, 1)
        }
        CallKind::Create | CallKind::Create2 => compute_child_address(&parent.code_address),
        CallKind::None => unreachable!("not a call-context-entering instruction"),
    }
}

pub fn child_storage_address(instr: &Instruction, parent: &CallContext) -> HexString {
    match instr.call_kind() {
        CallKind::Call | CallKind::StaticCall => stack_address(instr, 1),
        CallKind::DelegateCall | CallKind::CallCode => parent.storage_address.clone(),
        CallKind::Create | CallKind::Create2 => compute_child_address(&parent.code_address),
        CallKind::None => unreachable!("not a call-context-entering instruction"),
    }
}

pub fn child_value(instr: &Instruction, step: StepIndex) -> TaggedByteGroup {
    match instr.call_kind() {
        CallKind::Call | CallKind::CallCode => instr.flow.accesses.stack[2].value.clone(),
        CallKind::StaticCall => TaggedByteGroup::from_hexstring(&HexString::zeros(32), step),
        CallKind::DelegateCall => instr
            .flow
            .accesses
            .callvalue
            .first()
            .map(|access| access.value.clone())
            .unwrap_or_else(|| TaggedByteGroup::from_hexstring(&HexString::zeros(32), step)),
        CallKind::Create | CallKind::Create2 => instr.flow.accesses.stack[0].value.clone(),
        CallKind::None => unreachable!("not a call-context-entering instruction"),
    }
}

pub fn child_input(instr: &Instruction) -> TaggedByteGroup {
    match instr.call_kind() {
        CallKind::Call | CallKind::StaticCall | CallKind::DelegateCall | CallKind::CallCode => instr
            .flow
            .writes
            .calldata
            .as_ref()
            .expect("call-family flow-spec always records a calldata write")
            .value
            .clone(),
        CallKind::Create | CallKind::Create2 => TaggedByteGroup::new(),
        CallKind::None => unreachable!("not a call-context-entering instruction"),
    }
}

pub fn child_caller(instr: &Instruction, parent: &CallContext) -> HexString {
    match instr.call_kind() {
        CallKind::Call | CallKind::StaticCall | CallKind::CallCode => parent.storage_address.clone(),
        CallKind::DelegateCall => parent.msg_sender.clone(),
        CallKind::Create | CallKind::Create2 => parent.storage_address.clone(),
        CallKind::None => unreachable!("not a call-context-entering instruction"),
    }
}

pub fn child_is_created(instr: &Instruction) -> bool {
    matches!(instr.call_kind(), CallKind::Create | CallKind::Create2)
}

/// `(offset_access_index, size_access_index)` for the return-data
/// destination, which lands at a different stack position depending on
/// whether the opcode also carries a value argument.
fn return_destination_indexes(kind: CallKind) -> (usize, usize) {
    match kind {
        CallKind::Call | CallKind::CallCode => (5, 6),
        CallKind::StaticCall | CallKind::DelegateCall => (4, 5),
        other => unreachable!("{other:?} has no return-data destination"),
    }
}

/// Writes injected by the driver once a CALL-family instruction's child
/// context has exited normally: the success flag, plus a copy of the
/// child's return data into the caller's requested memory range.
pub fn get_return_writes(
    instr: &Instruction,
    child_return_data: &TaggedByteGroup,
    child_reverted: bool,
) -> StorageWrites {
    let (offset_index, size_index) = return_destination_indexes(instr.call_kind());
    let offset = instr.flow.accesses.stack[offset_index].value.get_hexstring().as_usize();
    let size = instr.flow.accesses.stack[size_index].value.get_hexstring().as_usize();

    let mut writes = StorageWrites::default();
    if size > 0 {
        let copy_len = size.min(child_return_data.len());
        writes.memory.push(MemoryWrite { offset, value: child_return_data.slice(0, copy_len) });
    }
    let success = if child_reverted { "0x0" } else { "0x1" };
    writes.stack_pushes.push(StackPush {
        value: TaggedByteGroup::from_hexstring(&HexString::new(success).unwrap().as_size(32), instr.step_index),
    });
    writes
}

/// Fallback used when a CALL-family instruction did not actually increase
/// depth (a call to a precompile or an EOA): success and return bytes are
/// read straight from the oracle instead of from a child context.
pub fn get_immediate_return_writes(instr: &Instruction, oracle: &InstructionOutputOracle) -> StorageWrites {
    let (offset_index, size_index) = return_destination_indexes(instr.call_kind());
    let offset = instr.flow.accesses.stack[offset_index].value.get_hexstring().as_usize();
    let size = instr.flow.accesses.stack[size_index].value.get_hexstring().as_usize();

    let mut writes = StorageWrites::default();
    if size > 0 {
        let bytes = oracle.memory.as_bytes();
        let mut out = Vec::with_capacity(size);
        for i in 0..size {
            out.push(TaggedByte {
                value: bytes.get(offset + i).copied().unwrap_or(0),
                created_at_step_index: instr.step_index,
            });
        }
        writes.memory.push(MemoryWrite { offset, value: TaggedByteGroup::from_bytes(out) });
    }
    let success = oracle.stack.first().cloned().unwrap_or_else(|| HexString::zeros(32));
    writes.stack_pushes.push(StackPush {
        value: TaggedByteGroup::from_hexstring(&success.as_size(32), instr.step_index),
    });
    writes
}

/// CREATE/CREATE2 never push the created address here; the upstream
/// implementation this crate follows leaves that unimplemented too.
pub fn get_create_return_writes() -> StorageWrites {
    StorageWrites::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::call_context::CallContextArena;
    use crate::environment::parsing_environment::ParsingEnvironment;
    use crate::flow::eval;
    use crate::instructions::flow_spec_for;
    use crate::instructions::Opcode;

    fn make_env() -> ParsingEnvironment {
        let root = CallContext::root(
            HexString::new("0x01").unwrap(),
            HexString::new("0x02").unwrap(),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
        );
        ParsingEnvironment::new(CallContextArena::new(), root)
    }

    fn push32(env: &mut ParsingEnvironment, hex: &str) {
        env.stack_mut()
            .push(TaggedByteGroup::from_hexstring(&HexString::new(hex).unwrap().as_size(32), 0))
            .unwrap();
    }

    #[test]
    fn call_child_fields_read_from_the_stack_tuple() {
        let mut env = make_env();
        // Pushed bottom-to-top; stack_arg(0) reads the top, so the last push
        // here lands at index 0: gas, addr, value, argsOffset, argsSize, retOffset, retSize.
        for v in ["0x1", "0x0", "0x0", "0x0", "0x0", "0x2000000000000000000000000000000000cafe", "0x0"] {
            push32(&mut env, v);
        }
        let oracle = InstructionOutputOracle::default();
        let (flow, _) = eval(flow_spec_for(Opcode::CALL), &mut env, &oracle);
        let instr = Instruction {
            opcode: Opcode::CALL,
            name: "CALL",
            program_counter: 0,
            step_index: 3,
            call_context: env.current_call_context,
            flow,
        };

        let parent = env.current_call_context().clone();
        let address = child_code_address(&instr, &parent);
        assert_eq!(address, HexString::new("0x2000000000000000000000000000000000cafe").unwrap());
        assert_eq!(child_storage_address(&instr, &parent), address);
        assert!(!child_is_created(&instr));
    }

    #[test]
    fn create_placeholder_address_is_deterministic() {
        let a = compute_child_address(&HexString::new("0xaabbcc").unwrap());
        let b = compute_child_address(&HexString::new("0xaabbcc").unwrap());
        assert_eq!(a, b);
    }
}
