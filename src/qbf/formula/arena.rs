//! Append-only region allocator of variable-size records, addressed by a
//! stable 32-bit word offset (`Ref`). This is the storage layer beneath
//! `constraint::ConstraintAllocator`; it knows nothing about clauses or
//! terms, only `u32` words, mirroring the `RegionAllocator<uint32_t>` /
//! `alloc.hh` split used by minisat and carried into the original Qute
//! solver (`solver_types.hh`: `CRef = RegionAllocator<uint32_t>::Ref`).
//!
//! A reference is reclaimed lazily: `free` only bumps a wasted-word
//! counter. Physical reclamation happens only when the owner performs a
//! whole-arena copy via `moveTo`, patching every reference it holds with
//! `reloc` first.

pub type Ref = u32;

/// Sentinel meaning "no reference" (the ground truth absence, not a valid word offset).
pub const REF_UNDEF: Ref = Ref::max_value();

pub struct RegionAllocator {
    memory: Vec<u32>,
    wasted: usize,
}

impl RegionAllocator {
    pub fn new() -> Self {
        RegionAllocator {
            memory: Vec::new(),
            wasted: 0,
        }
    }

    pub fn with_capacity(capacity_words: usize) -> Self {
        RegionAllocator {
            memory: Vec::with_capacity(capacity_words),
            wasted: 0,
        }
    }

    /// Reserve `words` contiguous u32 slots and return their starting offset.
    pub fn alloc(&mut self, words: usize) -> Ref {
        let offset = self.memory.len();
        assert!(offset + words <= Ref::max_value() as usize, "arena overflow");
        self.memory.resize(offset + words, 0);
        offset as Ref
    }

    #[inline]
    pub fn slice(&self, r: Ref, words: usize) -> &[u32] {
        let off = r as usize;
        &self.memory[off..off + words]
    }

    #[inline]
    pub fn slice_mut(&mut self, r: Ref, words: usize) -> &mut [u32] {
        let off = r as usize;
        &mut self.memory[off..off + words]
    }

    /// Lazily reclaim `words` words (physically freed only on the next compaction).
    pub fn free(&mut self, words: usize) {
        self.wasted += words;
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn wasted(&self) -> usize {
        self.wasted
    }

    /// Fraction of allocated space that is garbage; callers compact when
    /// this exceeds a configured ratio.
    pub fn garbage_fraction(&self) -> f64 {
        if self.memory.is_empty() {
            0.0
        } else {
            self.wasted as f64 / self.memory.len() as f64
        }
    }

    /// Copy `words` words starting at `src` from `self` into `dst`,
    /// returning the new reference. Used by higher layers implementing
    /// the "relocated" sentinel pattern: the first call for a given
    /// record should copy and remember the new ref; later calls forward.
    pub fn copy_into(&self, src: Ref, words: usize, dst: &mut RegionAllocator) -> Ref {
        let new_ref = dst.alloc(words);
        dst.memory[new_ref as usize..new_ref as usize + words]
            .copy_from_slice(&self.memory[src as usize..src as usize + words]);
        new_ref
    }

    /// Swap storage with `other`, e.g. to install a freshly compacted arena
    /// as the live one while the old one's memory is dropped.
    pub fn move_to(&mut self, other: &mut RegionAllocator) {
        std::mem::swap(self, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_contiguous_and_growing() {
        let mut ra = RegionAllocator::new();
        let a = ra.alloc(3);
        let b = ra.alloc(2);
        assert_eq!(a, 0);
        assert_eq!(b, 3);
        assert_eq!(ra.size(), 5);
    }

    #[test]
    fn copy_into_preserves_words() {
        let mut src = RegionAllocator::new();
        let r = src.alloc(4);
        src.slice_mut(r, 4).copy_from_slice(&[1, 2, 3, 4]);

        let mut dst = RegionAllocator::new();
        let r2 = src.copy_into(r, 4, &mut dst);
        assert_eq!(dst.slice(r2, 4), &[1, 2, 3, 4]);
    }

    #[test]
    fn free_only_bumps_wasted_counter() {
        let mut ra = RegionAllocator::new();
        ra.alloc(4);
        assert_eq!(ra.wasted(), 0);
        ra.free(4);
        assert_eq!(ra.wasted(), 4);
        assert_eq!(ra.size(), 4);
    }
}
