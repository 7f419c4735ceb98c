//! Experience Buffer - bounded ring of recent experiences
//!
//! Grows up to `capacity`; on overflow the oldest entries are dropped until
//! only `retain` remain.

use std::collections::VecDeque;

/// Bounded experience ring with batch trimming
#[derive(Debug, Clone)]
pub struct ExperienceBuffer<T> {
    capacity: usize,
    retain: usize,
    items: VecDeque<T>,
}

impl<T> ExperienceBuffer<T> {
    /// Create a buffer with the given overflow capacity and post-trim size
    pub fn new(capacity: usize, retain: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            retain: retain.clamp(1, capacity),
            items: VecDeque::new(),
        }
    }

    /// Append an item, trimming the oldest entries on overflow.
    ///
    /// Returns the number of dropped entries.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        if self.items.len() <= self.capacity {
            return 0;
        }
        let excess = self.items.len() - self.retain;
        self.items.drain(..excess);
        excess
    }

    /// Most recent `n` items, newest last
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_to_retain_on_overflow() {
        let mut buffer = ExperienceBuffer::new(10, 8);
        for i in 0..10 {
            assert_eq!(buffer.push(i), 0);
        }
        assert_eq!(buffer.len(), 10);

        assert_eq!(buffer.push(10), 3);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.iter().next(), Some(&3));
        assert_eq!(buffer.last(), Some(&10));
    }

    #[test]
    fn test_recent() {
        let mut buffer = ExperienceBuffer::new(100, 80);
        for i in 0..7 {
            buffer.push(i);
        }
        let recent: Vec<_> = buffer.recent(3).copied().collect();
        assert_eq!(recent, vec![4, 5, 6]);
        assert_eq!(buffer.recent(50).count(), 7);
    }
}
