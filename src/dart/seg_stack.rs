use crate::transport::SegmentId;

/// Fixed-capacity LIFO of free transport segment ids.
#[derive(Debug, Clone)]
pub(crate) struct SegmentIdStack {
    ids: Vec<SegmentId>,
    capacity: usize,
}

impl SegmentIdStack {
    /// Seeded with `[start, end)`, the lowest id is handed out first.
    pub(crate) fn new(start: SegmentId, end: SegmentId) -> SegmentIdStack {
        let ids: Vec<SegmentId> = (start..end).rev().collect();
        SegmentIdStack {
            capacity: ids.len(),
            ids,
        }
    }

    pub(crate) fn pop(&mut self) -> Option<SegmentId> {
        self.ids.pop()
    }

    /// Returns the id to the pool, `false` if the pool is already full.
    pub(crate) fn push(&mut self, id: SegmentId) -> bool {
        if self.ids.len() >= self.capacity {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub(crate) fn available(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_reuse() {
        let mut stack = SegmentIdStack::new(1, 4);
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(2));
        assert!(stack.push(1));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.available(), 0);
    }

    #[test]
    fn push_beyond_capacity_fails() {
        let mut stack = SegmentIdStack::new(5, 7);
        assert!(!stack.push(9));
        let id = stack.pop().unwrap();
        assert!(stack.push(id));
        assert_eq!(stack.available(), 2);
    }
}
