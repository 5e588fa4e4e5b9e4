//! One declarative flow-spec per opcode, built once and shared from a
//! static table - the "tagged variant + per-opcode table" design named as a
//! replacement for per-class inheritance.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::flow::dsl::*;
use crate::flow::Node;

use super::opcode::Opcode;

/// Whether an opcode is a member of the CALL family or the CREATE family -
/// the two kinds of instruction allowed to open a new call context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    None,
    Call,
    StaticCall,
    DelegateCall,
    CallCode,
    Create,
    Create2,
}

impl CallKind {
    pub fn of(opcode: u8) -> CallKind {
        match opcode {
            Opcode::CALL => CallKind::Call,
            Opcode::STATICCALL => CallKind::StaticCall,
            Opcode::DELEGATECALL => CallKind::DelegateCall,
            Opcode::CALLCODE => CallKind::CallCode,
            Opcode::CREATE => CallKind::Create,
            Opcode::CREATE2 => CallKind::Create2,
            _ => CallKind::None,
        }
    }

    pub fn is_call_context_entering(self) -> bool {
        !matches!(self, CallKind::None)
    }
}

fn pure_unary() -> Node {
    combine(vec![stack_push(oracle_stack_peek(0)), stack_arg(0)])
}
fn pure_binary() -> Node {
    combine(vec![stack_push(oracle_stack_peek(0)), stack_arg(0), stack_arg(1)])
}
fn pure_ternary() -> Node {
    combine(vec![stack_push(oracle_stack_peek(0)), stack_arg(0), stack_arg(1), stack_arg(2)])
}
fn push_oracle() -> Node {
    stack_push(oracle_stack_peek(0))
}
fn dup(n: usize) -> Node {
    stack_push(stack_peek(n - 1))
}
fn swap(n: usize) -> Node {
    combine(vec![stack_set(0, stack_peek(n)), stack_set(n, stack_peek(0))])
}
fn log(n: usize) -> Node {
    let mut nodes = vec![mem_range(stack_arg(0), stack_arg(1))];
    for i in 0..n {
        nodes.push(stack_arg(2 + i));
    }
    combine(nodes)
}

fn build_table() -> HashMap<u8, Node> {
    let mut table = HashMap::new();

    table.insert(Opcode::STOP, noop());
    for op in [
        Opcode::ADD, Opcode::MUL, Opcode::SUB, Opcode::DIV, Opcode::SDIV, Opcode::MOD,
        Opcode::SMOD, Opcode::EXP, Opcode::SIGNEXTEND, Opcode::LT, Opcode::GT, Opcode::SLT,
        Opcode::SGT, Opcode::EQ, Opcode::AND, Opcode::OR, Opcode::XOR, Opcode::BYTE,
        Opcode::SHL, Opcode::SHR, Opcode::SAR,
    ] {
        table.insert(op, pure_binary());
    }
    table.insert(Opcode::ADDMOD, pure_ternary());
    table.insert(Opcode::MULMOD, pure_ternary());
    table.insert(Opcode::ISZERO, pure_unary());
    table.insert(Opcode::NOT, pure_unary());
    table.insert(Opcode::KECCAK256, combine(vec![stack_push(oracle_stack_peek(0)), mem_range(stack_arg(0), stack_arg(1))]));

    table.insert(Opcode::ADDRESS, stack_push(current_storage_address()));
    table.insert(Opcode::BALANCE, combine(vec![stack_push(oracle_stack_peek(0)), balance_of(to_size(stack_arg(0), 20))]));
    for op in [
        Opcode::ORIGIN, Opcode::CALLER, Opcode::GASPRICE, Opcode::COINBASE, Opcode::TIMESTAMP,
        Opcode::NUMBER, Opcode::PREVRANDAO, Opcode::GASLIMIT, Opcode::CHAINID, Opcode::BASEFEE,
        Opcode::BLOBBASEFEE, Opcode::PC, Opcode::GAS, Opcode::CODESIZE,
    ] {
        table.insert(op, push_oracle());
    }
    table.insert(Opcode::CALLVALUE, stack_push(callvalue()));
    table.insert(Opcode::CALLDATALOAD, stack_push(calldata_range(stack_arg(0), const_int(32))));
    table.insert(Opcode::CALLDATASIZE, stack_push(calldata_size()));
    table.insert(Opcode::CALLDATACOPY, mem_write(stack_arg(0), calldata_range(stack_arg(1), stack_arg(2))));
    table.insert(
        Opcode::CODECOPY,
        combine(vec![
            mem_write(stack_arg(0), oracle_mem_range_peek(stack_peek(0), stack_arg(2))),
            stack_arg(1),
        ]),
    );
    table.insert(
        Opcode::EXTCODECOPY,
        combine(vec![
            stack_arg(0),
            stack_arg(2),
            mem_write(stack_arg(1), oracle_mem_range_peek(stack_arg(1), stack_arg(3))),
        ]),
    );
    for op in [Opcode::EXTCODESIZE, Opcode::EXTCODEHASH, Opcode::BLOCKHASH, Opcode::BLOBHASH] {
        table.insert(op, combine(vec![stack_push(oracle_stack_peek(0)), stack_arg(0)]));
    }
    table.insert(Opcode::RETURNDATASIZE, stack_push(return_data_size()));
    table.insert(Opcode::RETURNDATACOPY, mem_write(stack_arg(0), return_data_range(stack_arg(1), stack_arg(2))));
    table.insert(Opcode::SELFBALANCE, combine(vec![stack_push(oracle_stack_peek(0)), balance_of(current_storage_address())]));

    table.insert(Opcode::POP, stack_arg(0));
    table.insert(Opcode::MLOAD, stack_push(mem_range(stack_arg(0), const_int(32))));
    table.insert(Opcode::MSTORE, mem_write(stack_arg(0), stack_arg(1)));
    table.insert(Opcode::MSTORE8, mem_write(stack_arg(0), to_size(stack_arg(1), 1)));
    table.insert(Opcode::SLOAD, stack_push(persistent_storage_get(stack_arg(0))));
    table.insert(Opcode::SSTORE, persistent_storage_set(stack_arg(0), stack_arg(1)));
    table.insert(Opcode::JUMP, stack_arg(0));
    table.insert(Opcode::JUMPI, combine(vec![stack_arg(0), stack_arg(1)]));
    table.insert(Opcode::MSIZE, stack_push(mem_size()));
    table.insert(Opcode::JUMPDEST, noop());
    table.insert(Opcode::TLOAD, stack_push(transient_storage_get(stack_arg(0))));
    table.insert(Opcode::TSTORE, transient_storage_set(stack_arg(0), stack_arg(1)));
    table.insert(Opcode::MCOPY, mem_write(stack_arg(0), mem_range(stack_arg(1), stack_arg(2))));

    for byte in Opcode::PUSH0..=Opcode::PUSH32 {
        table.insert(byte, push_oracle());
    }
    for byte in Opcode::DUP1..=Opcode::DUP16 {
        table.insert(byte, dup((byte - Opcode::DUP1 + 1) as usize));
    }
    for byte in Opcode::SWAP1..=Opcode::SWAP16 {
        table.insert(byte, swap((byte - Opcode::SWAP1 + 1) as usize));
    }
    for byte in Opcode::LOG0..=Opcode::LOG4 {
        table.insert(byte, log((byte - Opcode::LOG0) as usize));
    }

    table.insert(Opcode::CREATE, combine(vec![
        balance_transfer(current_storage_address(), const_hex("0xabcd1234abcd1234abcd1234abcd1234abcd1234"), stack_arg(0)),
        mem_range(stack_arg(1), stack_arg(2)),
    ]));
    table.insert(Opcode::CREATE2, combine(vec![
        balance_transfer(current_storage_address(), const_hex("0xabcd1234abcd1234abcd1234abcd1234abcd1234"), stack_arg(0)),
        mem_range(stack_arg(1), stack_arg(2)),
        stack_arg(3),
    ]));
    table.insert(Opcode::CALL, combine(vec![
        stack_arg(0),
        balance_transfer(current_storage_address(), stack_arg(1), stack_arg(2)),
        calldata_write(mem_range(stack_arg(3), stack_arg(4))),
        mem_range(stack_arg(5), stack_arg(6)),
    ]));
    table.insert(Opcode::CALLCODE, combine(vec![
        stack_arg(0),
        balance_transfer(current_storage_address(), stack_arg(1), stack_arg(2)),
        calldata_write(mem_range(stack_arg(3), stack_arg(4))),
        mem_range(stack_arg(5), stack_arg(6)),
    ]));
    table.insert(Opcode::DELEGATECALL, combine(vec![
        stack_arg(0),
        stack_arg(1),
        calldata_write(mem_range(stack_arg(2), stack_arg(3))),
        mem_range(stack_arg(4), stack_arg(5)),
        callvalue(),
    ]));
    table.insert(Opcode::STATICCALL, combine(vec![
        stack_arg(0),
        stack_arg(1),
        calldata_write(mem_range(stack_arg(2), stack_arg(3))),
        mem_range(stack_arg(4), stack_arg(5)),
    ]));

    table.insert(Opcode::RETURN, return_data_write(mem_range(stack_arg(0), stack_arg(1))));
    table.insert(Opcode::REVERT, return_data_write(mem_range(stack_arg(0), stack_arg(1))));
    table.insert(Opcode::INVALID, noop());
    table.insert(Opcode::SELFDESTRUCT, selfdestruct(current_storage_address(), stack_arg(0)));

    table
}

lazy_static! {
    static ref FLOW_TABLE: HashMap<u8, Node> = build_table();
}

/// The flow-spec tree for `opcode`, or a no-op for anything undefined.
pub fn flow_spec_for(opcode: u8) -> &'static Node {
    FLOW_TABLE.get(&opcode).unwrap_or_else(|| FLOW_TABLE.get(&Opcode::INVALID).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_opcode_has_a_spec() {
        let ranges: Vec<std::ops::RangeInclusive<u8>> = vec![
            0x00..=0x0B, 0x10..=0x1D, 0x20..=0x20, 0x30..=0x4A, 0x50..=0x5E, 0x5F..=0x9F,
            0xA0..=0xA4, 0xF0..=0xF5, 0xFA..=0xFA, 0xFD..=0xFF,
        ];
        for range in ranges {
            for byte in range {
                assert!(FLOW_TABLE.contains_key(&byte), "missing flow spec for opcode {byte:#04x}");
            }
        }
    }

    #[test]
    fn call_kind_recognizes_the_six_context_entering_opcodes() {
        assert_eq!(CallKind::of(Opcode::CALL), CallKind::Call);
        assert_eq!(CallKind::of(Opcode::STATICCALL), CallKind::StaticCall);
        assert_eq!(CallKind::of(Opcode::DELEGATECALL), CallKind::DelegateCall);
        assert_eq!(CallKind::of(Opcode::CALLCODE), CallKind::CallCode);
        assert_eq!(CallKind::of(Opcode::CREATE), CallKind::Create);
        assert_eq!(CallKind::of(Opcode::CREATE2), CallKind::Create2);
        assert_eq!(CallKind::of(Opcode::ADD), CallKind::None);
    }
}
