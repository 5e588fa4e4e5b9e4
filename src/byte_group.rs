//! Byte-level provenance: [`TaggedByte`] and [`TaggedByteGroup`].
//!
//! Every byte that ever sits on the stack, in memory, in storage or in
//! calldata/return-data is tagged with the step index of the instruction
//! that produced it. Concatenation, slicing and resizing all preserve these
//! tags, which is what lets [`crate::graph::FlowGraph`] reconstruct
//! instruction-level data dependencies after the fact.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::hexstring::HexString;
use crate::step_index::StepIndex;

/// A single byte plus the step index that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaggedByte {
    pub value: u8,
    pub created_at_step_index: StepIndex,
}

/// An ordered sequence of [`TaggedByte`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedByteGroup(Vec<TaggedByte>);

impl TaggedByteGroup {
    pub fn new() -> Self {
        TaggedByteGroup(Vec::new())
    }

    /// Tags every byte of `hex` with `step_index`.
    pub fn from_hexstring(hex: &HexString, step_index: StepIndex) -> Self {
        TaggedByteGroup(
            hex.as_bytes()
                .iter()
                .map(|&value| TaggedByte { value, created_at_step_index: step_index })
                .collect(),
        )
    }

    pub fn from_bytes(bytes: Vec<TaggedByte>) -> Self {
        TaggedByteGroup(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bytes(&self) -> &[TaggedByte] {
        &self.0
    }

    /// Renders the underlying bytes as a [`HexString`], dropping provenance.
    pub fn get_hexstring(&self) -> HexString {
        HexString::from_bytes(self.0.iter().map(|b| b.value).collect())
    }

    /// `[start, end)`, like slice indexing. Panics if out of range, same as a slice.
    pub fn slice(&self, start: usize, end: usize) -> TaggedByteGroup {
        TaggedByteGroup(self.0[start..end].to_vec())
    }

    /// The right-most `n` bytes, or the whole group if it is shorter than `n`.
    pub fn tail(&self, n: usize) -> TaggedByteGroup {
        let start = self.0.len().saturating_sub(n);
        TaggedByteGroup(self.0[start..].to_vec())
    }

    pub fn concat(mut self, other: TaggedByteGroup) -> TaggedByteGroup {
        self.0.extend(other.0);
        self
    }

    /// All distinct step indexes any byte in this group depends on.
    pub fn depends_on_instruction_indexes(&self) -> BTreeSet<StepIndex> {
        self.0.iter().map(|b| b.created_at_step_index).collect()
    }

    /// Splits into maximal contiguous runs that each share a single step index.
    pub fn split_by_dependencies(&self) -> Vec<TaggedByteGroup> {
        self.0
            .iter()
            .copied()
            .group_by(|b| b.created_at_step_index)
            .into_iter()
            .map(|(_, group)| TaggedByteGroup(group.collect()))
            .collect()
    }

    /// Left-pads with zero bytes tagged at `step_index`, or right-truncates
    /// (keeping the right-most `size` bytes and their original tags) to reach
    /// exactly `size` bytes.
    pub fn to_size(&self, size: usize, step_index: StepIndex) -> TaggedByteGroup {
        if self.0.len() > size {
            self.tail(size)
        } else if self.0.len() < size {
            let mut padding: Vec<TaggedByte> = (0..size - self.0.len())
                .map(|_| TaggedByte { value: 0, created_at_step_index: step_index })
                .collect();
            padding.extend(self.0.iter().copied());
            TaggedByteGroup(padding)
        } else {
            self.clone()
        }
    }
}

impl std::ops::Index<std::ops::Range<usize>> for TaggedByteGroup {
    type Output = [TaggedByte];

    fn index(&self, range: std::ops::Range<usize>) -> &[TaggedByte] {
        &self.0[range]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_by_dependencies_groups_contiguous_runs() {
        let mut bytes = Vec::new();
        bytes.extend(TaggedByteGroup::from_hexstring(&HexString::new("1122").unwrap(), 1).0);
        bytes.extend(TaggedByteGroup::from_hexstring(&HexString::new("3344").unwrap(), 1).0);
        bytes.extend(TaggedByteGroup::from_hexstring(&HexString::new("55").unwrap(), 2).0);
        let group = TaggedByteGroup(bytes);

        let split = group.split_by_dependencies();

        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), 4);
        assert_eq!(split[1].len(), 1);
    }

    #[test]
    fn depends_on_instruction_indexes_is_a_set() {
        let a = TaggedByteGroup::from_hexstring(&HexString::new("11").unwrap(), 1);
        let b = TaggedByteGroup::from_hexstring(&HexString::new("22").unwrap(), 1);
        let group = a.concat(b);

        assert_eq!(group.depends_on_instruction_indexes(), BTreeSet::from([1]));
    }

    #[test]
    fn to_size_pads_left_with_current_step() {
        let group = TaggedByteGroup::from_hexstring(&HexString::new("ab").unwrap(), 1);
        let padded = group.to_size(3, 5);

        assert_eq!(padded.get_hexstring().to_hex(), "0000ab");
        assert_eq!(padded.bytes()[0].created_at_step_index, 5);
        assert_eq!(padded.bytes()[2].created_at_step_index, 1);
    }

    #[test]
    fn to_size_truncates_right_preserving_tags() {
        let group = TaggedByteGroup::from_hexstring(&HexString::new("aabbcc").unwrap(), 1);
        let truncated = group.to_size(2, 5);

        assert_eq!(truncated.get_hexstring().to_hex(), "bbcc");
    }
}
