//! Byte-addressable linear memory, expanding in 32-byte words like the EVM does.

use crate::byte_group::{TaggedByte, TaggedByteGroup};
use crate::step_index::StepIndex;

#[derive(Clone, Debug, Default)]
pub struct Memory {
    bytes: Vec<TaggedByte>,
}

fn round_up_to_word(size: usize) -> usize {
    const WORD: usize = 32;
    ((size + WORD - 1) / WORD) * WORD
}

impl Memory {
    pub fn new() -> Self {
        Memory { bytes: Vec::new() }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Reads `[offset, offset+size)`. Never fails: any tail past the current
    /// size is synthesized as zero bytes tagged with `reading_step`. Does not
    /// expand the underlying buffer.
    pub fn get(&self, offset: usize, size: usize, reading_step: StepIndex) -> TaggedByteGroup {
        let mut result = Vec::with_capacity(size);
        for i in 0..size {
            let index = offset + i;
            if index < self.bytes.len() {
                result.push(self.bytes[index]);
            } else {
                result.push(TaggedByte { value: 0, created_at_step_index: reading_step });
            }
        }
        TaggedByteGroup::from_bytes(result)
    }

    /// Expands the buffer (if needed) to cover `[offset, offset+size)`,
    /// rounding up to the next 32-byte word, without writing any value.
    /// Newly created bytes are tagged with `step`.
    pub fn check_expansion(&mut self, offset: usize, size: usize, step: StepIndex) {
        let required = offset + size;
        if required > self.bytes.len() {
            let new_len = round_up_to_word(required);
            self.bytes.resize(new_len, TaggedByte { value: 0, created_at_step_index: step });
        }
    }

    /// Writes `value` at `offset`, expanding (and tagging any gap/padding
    /// bytes with `step`) as necessary.
    pub fn set(&mut self, offset: usize, value: &TaggedByteGroup, step: StepIndex) {
        self.check_expansion(offset, value.len(), step);
        for (i, byte) in value.bytes().iter().enumerate() {
            self.bytes[offset + i] = *byte;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexstring::HexString;

    fn group(hex: &str, step: StepIndex) -> TaggedByteGroup {
        TaggedByteGroup::from_hexstring(&HexString::new(hex).unwrap(), step)
    }

    #[test]
    fn empty_memory_has_zero_size() {
        assert_eq!(Memory::new().size(), 0);
    }

    #[test]
    fn set_expands_to_word_boundary() {
        let mut mem = Memory::new();
        mem.set(10, &group(&"00".repeat(32), 1), 1);
        assert_eq!(mem.size(), 64);
    }

    #[test]
    fn set_tags_gap_and_padding_with_writing_step_but_keeps_value_tags() {
        let mut mem = Memory::new();
        mem.set(10, &group(&"00".repeat(32), 1), 2);

        let gap = mem.get(0, 10, -1);
        let written = mem.get(10, 32, -1);
        let padding = mem.get(42, 22, -1);

        assert!(gap.bytes().iter().all(|b| b.created_at_step_index == 2));
        assert!(written.bytes().iter().all(|b| b.created_at_step_index == 1));
        assert!(padding.bytes().iter().all(|b| b.created_at_step_index == 2));
    }

    #[test]
    fn get_reads_stored_bytes() {
        let mut mem = Memory::new();
        mem.set(0, &group("1122334400000000000000000000000000000000000000000000000000000000", -1), -1);

        let result = mem.get(2, 4, -1);

        assert_eq!(result.get_hexstring().to_hex(), "33440000");
    }

    #[test]
    fn get_does_not_expand() {
        let mem = Memory::new();
        let _ = mem.get(50, 20, -1);
        assert_eq!(mem.size(), 0);
    }

    #[test]
    fn check_expansion_tags_new_bytes_without_writing() {
        let mut mem = Memory::new();
        mem.set(0, &group(&"11".repeat(64), -1), -1);

        mem.check_expansion(50, 20, 1);

        assert_eq!(mem.size(), 96);
        let expanded = mem.get(64, 32, -1);
        assert!(expanded.bytes().iter().all(|b| b.created_at_step_index == 1));
    }
}
