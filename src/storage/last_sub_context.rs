//! Remembers, per call context, the most recently exited child context.
//! Consulted by RETURNDATASIZE/RETURNDATACOPY and similar nodes to find the
//! return data of the last sub-call made from the current context.

use crate::ids::CallContextId;

#[derive(Clone, Debug, Default)]
pub struct LastExecutedSubContextStorage {
    slots: Vec<Option<CallContextId>>,
}

impl LastExecutedSubContextStorage {
    pub fn new() -> Self {
        LastExecutedSubContextStorage { slots: vec![None] }
    }

    pub fn current(&self) -> Option<CallContextId> {
        *self.slots.last().expect("context stack is never empty")
    }

    pub fn on_call_enter(&mut self) {
        self.slots.push(None);
    }

    fn record_exit(&mut self, exited: CallContextId) {
        self.slots.pop();
        if let Some(slot) = self.slots.last_mut() {
            *slot = Some(exited);
        }
    }

    pub fn on_call_exit(&mut self, exited: CallContextId) {
        self.record_exit(exited);
    }

    pub fn on_revert(&mut self, exited: CallContextId) {
        self.record_exit(exited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_exited_child_in_parent_slot() {
        let mut storage = LastExecutedSubContextStorage::new();
        assert_eq!(storage.current(), None);

        storage.on_call_enter();
        storage.on_call_exit(CallContextId(1));

        assert_eq!(storage.current(), Some(CallContextId(1)));
    }

    #[test]
    fn revert_also_records_the_exited_child() {
        let mut storage = LastExecutedSubContextStorage::new();
        storage.on_call_enter();
        storage.on_revert(CallContextId(2));

        assert_eq!(storage.current(), Some(CallContextId(2)));
    }
}
