//! Function/event signature lookup: an external collaborator this crate
//! only depends on through a trait, so a real 4-byte-directory-backed
//! implementation can be swapped in without touching the core.

use crate::hexstring::HexString;

/// Resolves a 4-byte function selector (or 32-byte event topic) to a
/// human-readable signature, when known.
pub trait SignatureLookup {
    fn lookup_function(&self, selector: &HexString) -> Option<String>;
    fn lookup_event(&self, topic: &HexString) -> Option<String>;
}

/// A lookup that never resolves anything - the default when no signature
/// database is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSignatureLookup;

impl SignatureLookup for NullSignatureLookup {
    fn lookup_function(&self, _selector: &HexString) -> Option<String> {
        None
    }

    fn lookup_event(&self, _topic: &HexString) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_lookup_resolves_nothing() {
        let lookup = NullSignatureLookup;
        assert_eq!(lookup.lookup_function(&HexString::new("0x12345678").unwrap()), None);
        assert_eq!(lookup.lookup_event(&HexString::zeros(32)), None);
    }
}
