//! Priority-partitioned queue
//!
//! Items are grouped by priority value. Partitions are visited in ascending
//! order (lower value first) and each partition is FIFO. Empty partitions are
//! removed so length queries only touch occupied levels.

use std::collections::{BTreeMap, VecDeque};

use crate::request::Request;

/// Anything that carries a priority value
pub trait Prioritized {
    fn priority(&self) -> i32;
}

impl Prioritized for Request {
    fn priority(&self) -> i32 {
        Request::priority(self)
    }
}

/// Queue of items partitioned by priority
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    partitions: BTreeMap<i32, VecDeque<T>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
        }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back of the item's priority partition
    pub fn push(&mut self, item: T) {
        self.partitions.entry(item.priority()).or_default().push_back(item);
    }

    /// Remove and return the head of the lowest occupied partition
    pub fn shift(&mut self) -> Option<T> {
        let mut entry = self.partitions.first_entry()?;
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        item
    }

    /// The partition that [`shift`](Self::shift) would take from
    pub fn peek(&self) -> Option<&VecDeque<T>> {
        self.partitions.values().next()
    }

    /// Next item in line, without removing it
    pub fn front(&self) -> Option<&T> {
        self.peek().and_then(VecDeque::front)
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Number of occupied priority levels
    pub fn levels(&self) -> usize {
        self.partitions.len()
    }

    pub fn clear(&mut self) {
        self.partitions.clear();
    }

    /// Items in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.partitions.values().flat_map(|p| p.iter())
    }
}
