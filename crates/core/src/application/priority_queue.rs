// Priority queue with FIFO ordering inside each priority band

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::domain::Priority;

struct QueueEntry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    // BinaryHeap is a max-heap: the lowest (priority value, seq) must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pops the lowest priority value first; equal priorities pop in insertion order
pub struct PriorityQueue<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_seq: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, priority: Priority, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            item,
        });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn peek_priority(&self) -> Option<Priority> {
        self.heap.peek().map(|entry| entry.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove and return the first item matching `pred` (ordering of the rest is kept)
    pub fn remove_where<F>(&mut self, mut pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        let position = entries.iter().position(|entry| pred(&entry.item));
        let removed = position.map(|idx| entries.swap_remove(idx).item);
        self.heap = BinaryHeap::from(entries);
        removed
    }

    /// Drain every item in pop order
    pub fn drain_ordered(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_value_pops_first() {
        let mut q = PriorityQueue::new();
        q.push(Priority::Normal, "normal");
        q.push(Priority::Critical, "critical");
        q.push(Priority::Low, "low");
        q.push(Priority::High, "high");

        assert_eq!(q.peek_priority(), Some(Priority::Critical));
        assert_eq!(q.drain_ordered(), vec!["critical", "high", "normal", "low"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_fifo_within_band() {
        let mut q = PriorityQueue::new();
        for i in 0..50 {
            q.push(Priority::Normal, i);
        }
        q.push(Priority::High, 100);

        assert_eq!(q.pop(), Some(100));
        let rest = q.drain_ordered();
        assert_eq!(rest, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_where_keeps_order() {
        let mut q = PriorityQueue::new();
        q.push(Priority::Low, 1);
        q.push(Priority::Low, 2);
        q.push(Priority::Low, 3);

        assert_eq!(q.remove_where(|&x| x == 2), Some(2));
        assert_eq!(q.remove_where(|&x| x == 42), None);
        assert_eq!(q.len(), 2);
        assert_eq!(q.drain_ordered(), vec![1, 3]);
    }
}
