//! Tracks only *when* a balance last changed, never its value - the actual
//! amount is outside this crate's scope and is consulted from the oracle
//! when a caller needs it.

use std::collections::HashMap;

use crate::hexstring::HexString;
use crate::step_index::{StepIndex, PRESTATE};

#[derive(Clone, Debug, Default)]
pub struct Balances {
    last_modified: HashMap<HexString, StepIndex>,
}

impl Balances {
    pub fn new() -> Self {
        Balances { last_modified: HashMap::new() }
    }

    pub fn last_modified_at_step_index(&self, address: &HexString) -> StepIndex {
        self.last_modified.get(&address.as_address()).copied().unwrap_or(PRESTATE)
    }

    pub fn modified_at_step_index(&mut self, address: &HexString, step: StepIndex) {
        self.last_modified.insert(address.as_address(), step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_address_is_prestate() {
        let balances = Balances::new();
        assert_eq!(balances.last_modified_at_step_index(&HexString::new("0xabcd").unwrap()), PRESTATE);
    }

    #[test]
    fn modified_address_reports_its_step() {
        let mut balances = Balances::new();
        let addr = HexString::new("0xabcd").unwrap();
        balances.modified_at_step_index(&addr, 5);
        assert_eq!(balances.last_modified_at_step_index(&addr), 5);
    }
}
