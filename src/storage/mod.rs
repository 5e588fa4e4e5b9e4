pub mod address_key;
pub mod balances;
pub mod context_specific;
pub mod last_sub_context;
pub mod memory;
pub mod revertable;
pub mod stack;

pub use address_key::AddressKeyStorage;
pub use balances::Balances;
pub use context_specific::ContextSpecificStorage;
pub use last_sub_context::LastExecutedSubContextStorage;
pub use memory::Memory;
pub use revertable::RevertableStorage;
pub use stack::Stack;
