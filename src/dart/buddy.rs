//! Binary buddy sub-allocator used to parcel out the private transfer segment.
//!
//! The allocator manages a power-of-two byte range as a complete binary tree stored in a packed
//! byte array. Every node holds the (encoded) size of the largest contiguous free block of its
//! subtree, `0` meaning "nothing free", `k + 1` meaning a free run of `2^k` bytes. An allocated
//! node is marked `0` while its descendants keep their "fully free" encoding, which is what lets
//! [`BuddyAlloc::free`] find the allocated block by walking up from the leaf of its offset.

use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuddyError {
    /// The offset does not designate the start of a live allocation.
    InvalidOffset(usize),
}

impl std::fmt::Display for BuddyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BuddyError::InvalidOffset(offset) => {
                write!(f, "offset {} is not the start of an allocated block", offset)
            }
        }
    }
}

impl std::error::Error for BuddyError {}

#[derive(Clone)]
pub(crate) struct BuddyAlloc {
    tree: Vec<u8>,
    capacity: usize,
    allocated: usize,
    id: String,
}

impl std::fmt::Debug for BuddyAlloc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuddyAlloc")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated)
            .field("largest_free", &self.largest_free())
            .finish()
    }
}

fn encode(block: usize) -> u8 {
    block.trailing_zeros() as u8 + 1
}

fn decode(val: u8) -> usize {
    if val == 0 {
        0
    } else {
        1 << (val - 1)
    }
}

impl BuddyAlloc {
    /// `capacity` must be a power of two.
    pub(crate) fn new(id: impl Into<String>, capacity: usize) -> BuddyAlloc {
        assert!(
            capacity.is_power_of_two(),
            "buddy capacity {} is not a power of two",
            capacity
        );
        let mut tree = vec![0u8; 2 * capacity - 1];
        let mut node_size = capacity * 2;
        for (i, node) in tree.iter_mut().enumerate() {
            if (i + 1).is_power_of_two() {
                node_size /= 2;
            }
            *node = encode(node_size);
        }
        BuddyAlloc {
            tree,
            capacity,
            allocated: 0,
            id: id.into(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes handed out (after rounding to powers of two).
    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn largest_free(&self) -> usize {
        decode(self.tree[0])
    }

    fn update_parents(&mut self, mut index: usize, mut node_size: usize) {
        while index > 0 {
            index = (index - 1) / 2;
            node_size *= 2;
            let left = self.tree[2 * index + 1];
            let right = self.tree[2 * index + 2];
            let child_full = encode(node_size / 2);
            self.tree[index] = if left == child_full && right == child_full {
                encode(node_size)
            } else {
                left.max(right)
            };
        }
    }

    /// Reserve `size` bytes (rounded up to a power of two, minimum 1) and return their offset.
    pub(crate) fn alloc(&mut self, size: usize) -> Option<usize> {
        let block = size.max(1).checked_next_power_of_two()?;
        if block > self.capacity || decode(self.tree[0]) < block {
            warn!(
                "[{}] unable to reserve {} bytes, largest free block {}",
                self.id,
                block,
                self.largest_free()
            );
            return None;
        }
        let mut index = 0;
        let mut node_size = self.capacity;
        while node_size != block {
            let left = 2 * index + 1;
            index = if decode(self.tree[left]) >= block {
                left
            } else {
                left + 1
            };
            node_size /= 2;
        }
        self.tree[index] = 0;
        let offset = (index + 1) * node_size - self.capacity;
        self.update_parents(index, node_size);
        self.allocated += block;
        trace!("[{}] alloc {} bytes at offset {}", self.id, block, offset);
        Some(offset)
    }

    fn find_block(&self, offset: usize) -> Result<(usize, usize), BuddyError> {
        if offset >= self.capacity {
            return Err(BuddyError::InvalidOffset(offset));
        }
        let mut node_size = 1;
        let mut index = offset + self.capacity - 1;
        while self.tree[index] != 0 {
            if index == 0 {
                return Err(BuddyError::InvalidOffset(offset));
            }
            node_size *= 2;
            index = (index - 1) / 2;
        }
        if (index + 1) * node_size - self.capacity != offset {
            return Err(BuddyError::InvalidOffset(offset));
        }
        Ok((index, node_size))
    }

    /// Release the block starting at `offset`.
    pub(crate) fn free(&mut self, offset: usize) -> Result<(), BuddyError> {
        let (index, node_size) = self.find_block(offset)?;
        self.tree[index] = encode(node_size);
        self.update_parents(index, node_size);
        self.allocated -= node_size;
        trace!("[{}] free {} bytes at offset {}", self.id, node_size, offset);
        Ok(())
    }

    /// Size in bytes of the block starting at `offset`.
    #[cfg(test)]
    pub(crate) fn size_of(&self, offset: usize) -> Result<usize, BuddyError> {
        self.find_block(offset).map(|(_, size)| size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::Rng;

    #[test]
    fn rounds_to_powers_of_two() {
        let mut alloc = BuddyAlloc::new("rounding", 64);
        let a = alloc.alloc(3).unwrap();
        assert_eq!(alloc.size_of(a), Ok(4));
        let b = alloc.alloc(0).unwrap();
        assert_eq!(alloc.size_of(b), Ok(1));
        let c = alloc.alloc(17).unwrap();
        assert_eq!(alloc.size_of(c), Ok(32));
        assert_eq!(alloc.allocated(), 37);
    }

    #[test]
    fn fills_and_merges() {
        let mut alloc = BuddyAlloc::new("fill", 16);
        let offsets: Vec<usize> = (0..4).map(|_| alloc.alloc(4).unwrap()).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12]);
        assert_eq!(alloc.alloc(1), None);
        alloc.free(4).unwrap();
        alloc.free(0).unwrap();
        assert_eq!(alloc.largest_free(), 8);
        assert_eq!(alloc.alloc(8), Some(0));
        alloc.free(0).unwrap();
        alloc.free(8).unwrap();
        alloc.free(12).unwrap();
        assert_eq!(alloc.largest_free(), 16);
        assert_eq!(alloc.allocated(), 0);
    }

    #[test]
    fn rejects_invalid_offsets() {
        let mut alloc = BuddyAlloc::new("invalid", 32);
        let a = alloc.alloc(8).unwrap();
        assert_eq!(alloc.free(a + 2), Err(BuddyError::InvalidOffset(a + 2)));
        assert_eq!(alloc.free(16), Err(BuddyError::InvalidOffset(16)));
        assert_eq!(alloc.free(64), Err(BuddyError::InvalidOffset(64)));
        alloc.free(a).unwrap();
        assert_eq!(alloc.free(a), Err(BuddyError::InvalidOffset(a)));
    }

    #[test]
    fn too_large_request_fails() {
        let mut alloc = BuddyAlloc::new("large", 32);
        assert_eq!(alloc.alloc(33), None);
        assert_eq!(alloc.alloc(32), Some(0));
        assert_eq!(alloc.alloc(1), None);
    }

    #[test]
    fn random_alloc_free_returns_to_empty() {
        let mut rng = rand::thread_rng();
        let mut alloc = BuddyAlloc::new("random", 1 << 12);
        let mut live: Vec<(usize, usize)> = Vec::new();
        for _ in 0..2000 {
            if live.len() > 8 && rng.gen_bool(0.5) {
                live.shuffle(&mut rng);
                let (offset, _) = live.pop().unwrap();
                alloc.free(offset).unwrap();
            } else if let Some(offset) = alloc.alloc(rng.gen_range(1..200)) {
                let size = alloc.size_of(offset).unwrap();
                for (o, s) in live.iter() {
                    assert!(offset + size <= *o || o + s <= offset, "overlapping blocks");
                }
                live.push((offset, size));
            }
        }
        for (offset, _) in live {
            alloc.free(offset).unwrap();
        }
        assert_eq!(alloc.largest_free(), 1 << 12);
        assert_eq!(alloc.allocated(), 0);
    }
}
