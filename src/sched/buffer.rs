//! Bounded, re-insertable pending buffer.
//!
//! Tasks wait in `ready` until the loop evaluates them. A task that fails
//! its admission test is parked; parked tasks go back to the tail of
//! `ready` only when [`PendingBuffer::wake`] is called after a state change
//! that could unblock them.

use std::collections::VecDeque;

use crate::core::ConfigError;

#[derive(Debug)]
pub struct PendingBuffer<T> {
    ready: VecDeque<T>,
    parked: VecDeque<T>,
    capacity: usize,
}

impl<T> PendingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ready: VecDeque::new(),
            parked: VecDeque::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ready.len() + self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.parked.is_empty()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub fn has_room(&self, additional: usize) -> bool {
        self.len().saturating_add(additional) <= self.capacity
    }

    /// Appends at the tail. Never blocks; overflow is a configuration error.
    pub fn push(&mut self, item: T) -> Result<(), ConfigError> {
        if !self.has_room(1) {
            return Err(ConfigError::BufferFull {
                capacity: self.capacity,
            });
        }
        self.ready.push_back(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.ready.pop_front()
    }

    /// Parks an item that was popped and found inadmissible. It was already
    /// counted against capacity, so this cannot overflow.
    pub fn park(&mut self, item: T) {
        self.parked.push_back(item);
    }

    /// Re-appends every parked item to the ready tail, oldest first.
    /// Returns how many were moved.
    pub fn wake(&mut self) -> usize {
        let moved = self.parked.len();
        self.ready.extend(self.parked.drain(..));
        moved
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ready.iter().chain(self.parked.iter())
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.len();
        self.ready.clear();
        self.parked.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_respects_capacity() {
        let mut buffer = PendingBuffer::new(2);
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();
        assert_eq!(
            buffer.push(3).unwrap_err(),
            ConfigError::BufferFull { capacity: 2 }
        );
    }

    #[test]
    fn parked_items_count_against_capacity() {
        let mut buffer = PendingBuffer::new(2);
        buffer.push("a").unwrap();
        let item = buffer.pop().unwrap();
        buffer.park(item);
        buffer.push("b").unwrap();
        assert_eq!(buffer.len(), 2);
        assert!(buffer.push("c").is_err());
    }

    #[test]
    fn wake_reinserts_parked_at_tail() {
        let mut buffer = PendingBuffer::new(8);
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();
        let first = buffer.pop().unwrap();
        buffer.park(first);
        buffer.push(3).unwrap();

        assert_eq!(buffer.ready_len(), 2);
        assert_eq!(buffer.wake(), 1);
        let order: Vec<i32> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(buffer.is_empty());
    }
}
