//! The call-context state machine: classifies each instruction by the depth
//! delta between its trace event and the next one, and maintains the tree
//! of call contexts that execution actually walked through.

use std::collections::{HashMap, HashSet};

use crate::environment::call_context::{CallContext, CallContextArena, HaltType};
use crate::environment::parsing_environment::ParsingEnvironment;
use crate::error::Error;
use crate::ids::CallContextId;
use crate::instructions::opcode::Opcode;
use crate::instructions::{call_entering, CallKind, Instruction};

/// What happened to the call-context stack as a result of one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Depth unchanged; ordinary instruction.
    NoChange,
    /// A CALL-family opcode executed against a precompile/EOA: depth never
    /// changed, so the driver should apply `get_immediate_return_writes`.
    ImmediateReturn,
    /// A new call context was entered; holds its id.
    Entered(CallContextId),
    /// The current context halted normally (STOP/RETURN/SELFDESTRUCT).
    NormalHalt { child: CallContextId, parent: CallContextId },
    /// The current context reverted (REVERT).
    Reverted { child: CallContextId, parent: CallContextId },
    /// The current context aborted without a halt opcode (implicit depth drop).
    ExceptionalHalt { child: CallContextId, parent: CallContextId },
    /// The trace ended; no further depth information is available.
    EndOfTrace,
}

/// STOP, RETURN, REVERT and SELFDESTRUCT: the opcodes that can legitimately
/// end a call context.
pub fn is_halt_opcode(opcode: u8) -> bool {
    matches!(opcode, Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::SELFDESTRUCT)
}

/// `next_depth == current_depth - 1 AND opcode` is none of the halt opcodes.
pub fn makes_exceptional_halt(opcode: u8, current_depth: usize, next_depth: usize) -> bool {
    next_depth + 1 == current_depth && !is_halt_opcode(opcode)
}

/// Classifies `instr` given the depth the *next* trace event reports, and
/// applies the resulting transition to `env` (entering/exiting contexts as
/// needed). Returns the classification for the driver to act on.
pub fn transition(
    env: &mut ParsingEnvironment,
    instr: &Instruction,
    next_depth: Option<usize>,
) -> Result<Transition, Error> {
    let current = env.current_call_context;
    let current_depth = env.call_contexts.get(current).depth;

    let next_depth = match next_depth {
        None => return Ok(Transition::EndOfTrace),
        Some(d) => d,
    };

    if next_depth == current_depth {
        if instr.call_kind().is_call_context_entering() && !matches!(instr.call_kind(), CallKind::Create | CallKind::Create2)
        {
            return Ok(Transition::ImmediateReturn);
        }
        return Ok(Transition::NoChange);
    }

    if next_depth == current_depth + 1 {
        if !instr.call_kind().is_call_context_entering() {
            return Err(Error::ExpectedDepthChange(instr.to_string()));
        }
        let parent_ctx = env.call_contexts.get(current).clone();
        let code_address = call_entering::child_code_address(instr, &parent_ctx);
        let storage_address = call_entering::child_storage_address(instr, &parent_ctx);
        let value = call_entering::child_value(instr, instr.step_index);
        let input = call_entering::child_input(instr);
        let caller = call_entering::child_caller(instr, &parent_ctx);
        let is_created = call_entering::child_is_created(instr);

        let child = CallContext::child(
            current,
            current_depth,
            crate::ids::InstructionId(instr.step_index.max(0) as usize),
            caller,
            code_address,
            storage_address,
            input,
            value,
            is_created,
        );
        let child_id = env.call_contexts.push(child);
        env.on_call_enter(child_id);
        return Ok(Transition::Entered(child_id));
    }

    if next_depth + 1 == current_depth {
        if current_depth == 1 {
            return Err(Error::UnexpectedDepthChange { from: current_depth, to: next_depth as i64 });
        }
        let parent = env
            .call_contexts
            .get(current)
            .parent
            .expect("non-root context always has a parent");

        if is_halt_opcode(instr.opcode) && instr.opcode != Opcode::REVERT {
            env.call_contexts.get_mut(current).reverted = false;
            env.call_contexts.get_mut(current).halt_type = Some(HaltType::Normal);
            env.on_call_exit(parent);
            return Ok(Transition::NormalHalt { child: current, parent });
        }
        if instr.opcode == Opcode::REVERT {
            env.call_contexts.get_mut(current).reverted = true;
            env.call_contexts.get_mut(current).halt_type = Some(HaltType::Normal);
            env.on_revert(parent);
            return Ok(Transition::Reverted { child: current, parent });
        }
        env.call_contexts.get_mut(current).reverted = true;
        env.call_contexts.get_mut(current).halt_type = Some(HaltType::Exceptional);
        env.on_revert(parent);
        return Ok(Transition::ExceptionalHalt { child: current, parent });
    }

    Err(Error::UnexpectedDepthChange { from: current_depth, to: next_depth as i64 })
}

/// A node in the [`CallTree`]: one call context plus its sub-calls, in
/// execution order.
#[derive(Clone, Debug)]
pub struct CallTreeNode {
    pub call_context: CallContextId,
    pub children: Vec<CallTreeNode>,
}

#[derive(Clone, Debug)]
pub struct CallTree {
    pub root: CallTreeNode,
}

/// Builds the tree of call contexts actually visited by `instructions`,
/// attaching each context (in first-occurrence order) under its parent.
pub fn build_call_tree(root: CallContextId, instructions: &[Instruction], arena: &CallContextArena) -> CallTree {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for instr in instructions {
        if seen.insert(instr.call_context) {
            order.push(instr.call_context);
        }
    }

    let mut children_of: HashMap<CallContextId, Vec<CallContextId>> = HashMap::new();
    for &id in &order {
        if let Some(parent) = arena.get(id).parent {
            children_of.entry(parent).or_default().push(id);
        }
    }

    fn assemble(id: CallContextId, children_of: &HashMap<CallContextId, Vec<CallContextId>>) -> CallTreeNode {
        let children = children_of
            .get(&id)
            .map(|ids| ids.iter().map(|&child| assemble(child, children_of)).collect())
            .unwrap_or_default();
        CallTreeNode { call_context: id, children }
    }

    CallTree { root: assemble(root, &children_of) }
}

impl CallTree {
    /// A textual rendering suitable for CLI output: one indented line per
    /// call context, showing its storage address and halt outcome.
    pub fn render(&self, arena: &CallContextArena) -> String {
        let mut out = String::new();
        render_node(&self.root, arena, 0, &mut out);
        out
    }
}

fn render_node(node: &CallTreeNode, arena: &CallContextArena, depth: usize, out: &mut String) {
    let ctx = arena.get(node.call_context);
    let outcome = match ctx.halt_type {
        Some(HaltType::Normal) if ctx.reverted => "reverted",
        Some(HaltType::Normal) => "halted",
        Some(HaltType::Exceptional) => "exceptional halt",
        None => "running",
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("{} ({})\n", ctx.storage_address.with_prefix(), outcome));
    for child in &node.children {
        render_node(child, arena, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::byte_group::TaggedByteGroup;
    use crate::environment::call_context::CallContextArena;
    use crate::flow::Flow;
    use crate::hexstring::HexString;

    fn addr(s: &str) -> HexString {
        HexString::new(s).unwrap()
    }

    fn env_with_root() -> ParsingEnvironment {
        let root = CallContext::root(addr("0x01"), addr("0x02"), TaggedByteGroup::new(), TaggedByteGroup::new());
        ParsingEnvironment::new(CallContextArena::new(), root)
    }

    fn instr(opcode: u8, step: i64, call_context: CallContextId) -> Instruction {
        Instruction { opcode, name: Opcode::mnemonic(opcode), program_counter: 0, step_index: step, call_context, flow: Flow::default() }
    }

    #[test]
    fn no_depth_change_is_a_no_op() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        let i = instr(Opcode::ADD, 0, root);

        let t = transition(&mut env, &i, Some(1)).unwrap();

        assert_eq!(t, Transition::NoChange);
        assert_eq!(env.current_call_context, root);
    }

    #[test]
    fn non_call_opcode_with_depth_increase_is_an_error() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        let i = instr(Opcode::ADD, 0, root);

        let err = transition(&mut env, &i, Some(2)).unwrap_err();

        assert!(matches!(err, Error::ExpectedDepthChange(_)));
    }

    #[test]
    fn revert_at_depth_minus_one_rolls_back_and_marks_reverted() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        // Force a child context in at depth 2 first.
        env.call_contexts.get_mut(root).depth = 1;
        let child_id = env.call_contexts.push(CallContext::child(
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
        env.on_call_enter(child_id);

        let i = instr(Opcode::REVERT, 5, child_id);
        let t = transition(&mut env, &i, Some(1)).unwrap();

        match t {
            Transition::Reverted { child, parent } => {
                assert_eq!(child, child_id);
                assert_eq!(parent, root);
            }
            other => panic!("expected Reverted, got {other:?}"),
        }
        assert!(env.call_contexts.get(child_id).reverted);
        assert_eq!(env.current_call_context, root);
    }

    #[test]
    fn exceptional_halt_when_depth_drops_without_a_halt_opcode() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        let child_id = env.call_contexts.push(CallContext::child(
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
        env.on_call_enter(child_id);

        let i = instr(Opcode::ADD, 5, child_id);
        let t = transition(&mut env, &i, Some(1)).unwrap();

        assert!(matches!(t, Transition::ExceptionalHalt { .. }));
        assert_eq!(env.call_contexts.get(child_id).halt_type, Some(HaltType::Exceptional));
        assert!(env.call_contexts.get(child_id).reverted);
    }

    #[test]
    fn exiting_the_root_is_an_unexpected_depth_change() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        let i = instr(Opcode::STOP, 0, root);

        let err = transition(&mut env, &i, Some(0)).unwrap_err();

        assert!(matches!(err, Error::UnexpectedDepthChange { .. }));
    }

    #[test]
    fn build_call_tree_nests_children_in_execution_order() {
        let mut env = env_with_root();
        let root = env.current_call_context;
        let child_a = env.call_contexts.push(CallContext::child(
            root, 1, crate::ids::InstructionId(0), addr("0x02"), addr("0x0a"), addr("0x0a"),
            TaggedByteGroup::new(), TaggedByteGroup::new(), false,
        ));
        let child_b = env.call_contexts.push(CallContext::child(
            root, 1, crate::ids::InstructionId(1), addr("0x02"), addr("0x0b"), addr("0x0b"),
            TaggedByteGroup::new(), TaggedByteGroup::new(), false,
        ));

        let instructions = vec![
            instr(Opcode::CALL, 0, root),
            instr(Opcode::ADD, 1, child_a),
            instr(Opcode::STOP, 2, root),
            instr(Opcode::CALL, 3, root),
            instr(Opcode::STOP, 4, child_b),
        ];

        let tree = build_call_tree(root, &instructions, &env.call_contexts);

        assert_eq!(tree.root.call_context, root);
        assert_eq!(tree.root.children.len(), 2);
        assert_eq!(tree.root.children[0].call_context, child_a);
        assert_eq!(tree.root.children[1].call_context, child_b);
    }
}
