//! A stack of `T`, one entry per currently-open call context.
//!
//! Used for the [`Stack`](super::stack::Stack) and
//! [`Memory`](super::memory::Memory) storages: both are fresh on call entry
//! and discarded (not merged back) when the call context exits.

#[derive(Clone, Debug)]
pub struct ContextSpecificStorage<T> {
    frames: Vec<T>,
}

impl<T: Default> ContextSpecificStorage<T> {
    pub fn new() -> Self {
        ContextSpecificStorage { frames: vec![T::default()] }
    }

    pub fn current(&self) -> &T {
        self.frames.last().expect("context stack is never empty")
    }

    pub fn current_mut(&mut self) -> &mut T {
        self.frames.last_mut().expect("context stack is never empty")
    }

    pub fn on_call_enter(&mut self) {
        self.frames.push(T::default());
    }

    pub fn on_call_exit(&mut self) {
        self.frames.pop();
    }

    pub fn on_revert(&mut self) {
        self.frames.pop();
    }
}

impl<T: Default> Default for ContextSpecificStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}
