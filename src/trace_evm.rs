//! The trace-driven EVM: per-step orchestration from section 4.8. Parses one
//! instruction at a time, commits its writes, lets the call-context manager
//! classify the depth delta to the next event, and optionally checks the
//! simulator's post-state against the trace's own.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::call_context_manager::{is_halt_opcode, transition, Transition};
use crate::environment::call_context::{CallContext, CallContextArena};
use crate::environment::parsing_environment::{InstructionOutputOracle, ParsingEnvironment};
use crate::error::Error;
use crate::events::TraceEvent;
use crate::ids::CallContextId;
use crate::instructions::{call_entering, CallKind, Instruction};
use crate::step_index::StepIndex;
use crate::storage_io::StorageWrites;

/// Applies `writes` to `env` in the fixed commit order from section 4.8.
/// `BalanceTransfer`/`Selfdestruct` already mutated balances during
/// evaluation, so their write records here are purely descriptive.
pub fn apply_writes(env: &mut ParsingEnvironment, writes: &StorageWrites) -> Result<(), Error> {
    for _ in &writes.stack_pops {
        env.stack_mut().pop();
    }
    for set in &writes.stack_sets {
        env.stack_mut().set(set.index, set.value.clone())?;
    }
    for push in &writes.stack_pushes {
        env.stack_mut().push(push.value.clone())?;
    }

    let step = env.current_step_index;
    for write in &writes.memory {
        env.memory_mut().set(write.offset, &write.value, step);
    }

    // CalldataWrite carries no target location of its own: it only feeds
    // `call_entering::child_input` when a new context is entered.
    if let Some(return_write) = &writes.return_data {
        env.current_call_context_mut().return_data = return_write.value.clone();
    }

    for write in &writes.persistent_storage {
        let address = write.address.get_hexstring();
        let key = write.key.get_hexstring();
        env.persistent_storage_mut().set(&address, &key, write.value.clone());
    }
    for write in &writes.transient_storage {
        let address = write.address.get_hexstring();
        let key = write.key.get_hexstring();
        env.transient_storage_mut().set(&address, &key, write.value.clone());
    }

    Ok(())
}

fn mismatch(step: StepIndex, detail: String) -> Error {
    Error::OracleMismatch { step: step.max(0) as u64, detail }
}

/// Compares the simulator's post-state stack/memory against the next trace
/// event's reported post-state: invariants 2 and 3.
pub fn verify_storages(env: &ParsingEnvironment, next: &TraceEvent) -> Result<(), Error> {
    let step = env.current_step_index;
    let stack = env.stack().all();
    if stack.len() != next.stack.len() {
        return Err(mismatch(
            step,
            format!("stack size {} does not match oracle size {}", stack.len(), next.stack.len()),
        ));
    }
    for (i, (actual, expected)) in stack.iter().zip(next.stack.iter()).enumerate() {
        if actual.get_hexstring() != *expected {
            return Err(mismatch(step, format!("stack[{i}] mismatch")));
        }
    }

    let expected_memory_len = next.memory.len();
    let actual_memory = env.memory().get(0, expected_memory_len, step);
    if actual_memory.get_hexstring() != next.memory {
        return Err(mismatch(step, "memory prefix mismatch".to_string()));
    }

    Ok(())
}

/// Drives a single transaction's trace through the simulator, producing one
/// [`Instruction`] per executed step plus the call-context tree it walked.
pub struct TraceEVM {
    pub env: ParsingEnvironment,
    pub verify_storages: bool,
    pub instructions: Vec<Instruction>,
    root_call_context: CallContextId,
    /// The CALL/CREATE-family instruction that opened each still-open child
    /// context, kept around so its `get_*_return_writes` can be applied once
    /// that child exits.
    entering_instruction: HashMap<CallContextId, Instruction>,
}

impl TraceEVM {
    pub fn new(root: CallContext, verify_storages: bool) -> Self {
        let env = ParsingEnvironment::new(CallContextArena::new(), root);
        let root_call_context = env.current_call_context;
        TraceEVM {
            env,
            verify_storages,
            instructions: Vec::new(),
            root_call_context,
            entering_instruction: HashMap::new(),
        }
    }

    pub fn root_call_context(&self) -> CallContextId {
        self.root_call_context
    }

    /// Runs every event in `events` through [`Self::step`] in order.
    pub fn run(&mut self, events: &[TraceEvent]) -> Result<(), Error> {
        for i in 0..events.len() {
            let next = events.get(i + 1);
            self.step(&events[i], next)?;
        }
        Ok(())
    }

    fn step(&mut self, event: &TraceEvent, next: Option<&TraceEvent>) -> Result<(), Error> {
        let step_index = self.instructions.len() as StepIndex;
        self.env.current_step_index = step_index;

        let oracle = next
            .map(|n| InstructionOutputOracle { stack: n.stack.clone(), memory: n.memory.clone(), depth: n.depth })
            .unwrap_or_default();

        let instr = Instruction::parse(event.op, event.pc, step_index, &mut self.env, &oracle);
        debug!(step = step_index, instruction = %instr, "parsed instruction");

        if next.is_none() && !is_halt_opcode(instr.opcode) {
            // End of trace without a halt opcode (e.g. out of gas): record
            // the instruction but leave the environment untouched.
            self.instructions.push(instr);
            return Ok(());
        }

        apply_writes(&mut self.env, &instr.flow.writes)?;

        let next_depth = next.and_then(|n| n.depth);
        let outcome = transition(&mut self.env, &instr, next_depth)?;

        match outcome {
            Transition::Entered(child_id) => {
                self.entering_instruction.insert(child_id, instr.clone());
            }
            Transition::ImmediateReturn => {
                let return_writes = call_entering::get_immediate_return_writes(&instr, &oracle);
                apply_writes(&mut self.env, &return_writes)?;
            }
            Transition::NormalHalt { child, .. }
            | Transition::Reverted { child, .. }
            | Transition::ExceptionalHalt { child, .. } => {
                if let Some(calling_instr) = self.entering_instruction.remove(&child) {
                    let return_writes = match calling_instr.call_kind() {
                        CallKind::Create | CallKind::Create2 => call_entering::get_create_return_writes(),
                        _ => {
                            let child_ctx = self.env.call_contexts.get(child);
                            call_entering::get_return_writes(
                                &calling_instr,
                                &child_ctx.return_data.clone(),
                                child_ctx.reverted,
                            )
                        }
                    };
                    apply_writes(&mut self.env, &return_writes)?;
                }
            }
            Transition::NoChange | Transition::EndOfTrace => {}
        }

        if self.verify_storages {
            if let Some(n) = next {
                if let Err(err) = verify_storages(&self.env, n) {
                    warn!(step = step_index, %err, "oracle mismatch");
                    return Err(err);
                }
            }
        }

        self.instructions.push(instr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::byte_group::TaggedByteGroup;
    use crate::hexstring::HexString;
    use crate::instructions::Opcode;

    fn root_context() -> CallContext {
        CallContext::root(
            HexString::new("0x01").unwrap(),
            HexString::new("0x02").unwrap(),
            TaggedByteGroup::new(),
            TaggedByteGroup::new(),
        )
    }

    fn event(pc: usize, op: u8, stack: &[&str], depth: Option<usize>) -> TraceEvent {
        TraceEvent {
            pc,
            op,
            stack: stack.iter().map(|s| HexString::new(s).unwrap()).collect(),
            memory: HexString::zeros(0),
            depth,
        }
    }

    #[test]
    fn add_of_two_pushes_produces_five_and_tracks_provenance() {
        let mut evm = TraceEVM::new(root_context(), false);
        // PUSH1 0x2; PUSH1 0x3; ADD; STOP. Each event's stack is the oracle
        // for the *previous* event (the post-state the driver cannot cheaply
        // recompute), so it is shifted one slot ahead of the op it sits next to.
        let events = vec![
            event(0, Opcode::PUSH1, &[], Some(1)),
            event(2, Opcode::PUSH1, &["0x2"], Some(1)),
            event(4, Opcode::ADD, &["0x3", "0x2"], Some(1)),
            event(5, Opcode::STOP, &["0x5"], None),
        ];

        evm.run(&events).unwrap();

        assert_eq!(evm.instructions.len(), 4);
        let add = &evm.instructions[2];
        assert_eq!(add.flow.writes.stack_pushes[0].value.get_hexstring().as_usize(), 5);
        let deps = add.flow.writes.stack_pushes[0].value.depends_on_instruction_indexes();
        assert_eq!(deps, std::collections::BTreeSet::from([2]));
        assert_eq!(add.flow.accesses.stack.len(), 2);
    }

    #[test]
    fn trace_cut_short_after_a_non_halt_does_not_crash_or_commit() {
        let mut evm = TraceEVM::new(root_context(), false);
        let events = vec![
            event(0, Opcode::PUSH1, &[], Some(1)),
            event(2, Opcode::PUSH1, &["0x1"], Some(1)),
            event(4, Opcode::ADD, &["0x2", "0x1"], None),
        ];

        evm.run(&events).unwrap();

        assert_eq!(evm.instructions.len(), 3);
        assert_eq!(evm.env.stack().size(), 2);
    }

    #[test]
    fn return_as_last_step_commits_return_data() {
        let mut evm = TraceEVM::new(root_context(), false);
        let events = vec![
            event(0, Opcode::PUSH1, &["0x0"], Some(1)),
            event(2, Opcode::PUSH1, &["0x0", "0x0"], Some(1)),
            event(4, Opcode::RETURN, &[], None),
        ];

        evm.run(&events).unwrap();

        assert_eq!(evm.instructions.len(), 3);
        assert_eq!(evm.env.current_call_context().return_data.len(), 0);
    }

    #[test]
    fn verify_storages_passes_when_stack_and_memory_agree_with_the_oracle() {
        let mut evm = TraceEVM::new(root_context(), true);
        let events = vec![
            event(0, Opcode::PUSH1, &[], Some(1)),
            event(2, Opcode::PUSH1, &["0x2"], Some(1)),
            event(4, Opcode::STOP, &["0x2", "0x2"], None),
        ];

        assert!(evm.run(&events).is_ok());
    }

    #[test]
    fn verify_storages_flags_an_oracle_mismatch() {
        let mut evm = TraceEVM::new(root_context(), true);
        let events = vec![
            event(0, Opcode::PUSH1, &[], Some(1)),
            event(2, Opcode::PUSH1, &["0x2"], Some(1)),
            // Oracle claims a third stack entry appeared, which PUSH1 never produces.
            event(4, Opcode::STOP, &["0x2", "0x2", "0x9"], None),
        ];

        let err = evm.run(&events).unwrap_err();

        assert!(matches!(err, Error::OracleMismatch { .. }));
    }
}
