//! Ring Buffer Implementation

use std::collections::VecDeque;

/// Default buffer capacity (10 samples = 20 s at the 2 s poll interval)
pub const DEFAULT_CAPACITY: usize = 10;

/// Fixed-capacity FIFO that overwrites its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: VecDeque<T>,
    /// Capacity of the buffer
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least one slot)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item, evicting and returning the oldest one if full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.storage.len() == self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(item);
        evicted
    }

    /// Get the number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest item
    pub fn first(&self) -> Option<&T> {
        self.storage.front()
    }

    /// Most recent item
    pub fn last(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.storage.iter()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);

        let recent: Vec<_> = buffer.iter().rev().take(3).collect();
        assert_eq!(recent, vec![&400, &300, &200]); // Most recent first
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        for i in 0..5 {
            assert!(buffer.push(i).is_none());
        }
        assert_eq!(buffer.len(), buffer.capacity());

        // Next push evicts the oldest
        assert_eq!(buffer.push(5), Some(0));
        assert_eq!(buffer.first(), Some(&1));
        assert_eq!(buffer.last(), Some(&5));
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(capacity in 1usize..32, items in prop::collection::vec(any::<i32>(), 0..100)) {
            let mut buffer = RingBuffer::new(capacity);
            for item in &items {
                buffer.push(*item);
            }
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.len(), items.len().min(capacity));
            // Survivors are the newest items, in order
            let expected: Vec<i32> = items.iter().skip(items.len().saturating_sub(capacity)).copied().collect();
            prop_assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), expected);
        }
    }
}
