//! FIFO queue of connections waiting for a peer

use std::collections::{HashSet, VecDeque};

use super::types::ConnectionId;

/// Arrival-ordered queue with no duplicate entries.
#[derive(Debug, Default)]
pub struct WaitQueue {
    order: VecDeque<ConnectionId>,
    members: HashSet<ConnectionId>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail. Returns false if the id is already queued.
    pub fn push(&mut self, id: ConnectionId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        true
    }

    /// Pop the oldest waiting connection
    pub fn pop_front(&mut self) -> Option<ConnectionId> {
        let id = self.order.pop_front()?;
        self.members.remove(&id);
        Some(id)
    }

    /// Remove an id wherever it sits. Returns false if it was not queued.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.order.retain(|queued| *queued != id);
        true
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> {
        self.order.iter()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = WaitQueue::new();
        let ids: Vec<_> = (0..4).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            assert!(queue.push(*id));
        }

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop_front()).collect();
        assert_eq!(popped, ids);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_push_rejected() {
        let mut queue = WaitQueue::new();
        let id = ConnectionId::new();

        assert!(queue.push(id));
        assert!(!queue.push(id));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_from_middle_keeps_order() {
        let mut queue = WaitQueue::new();
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        queue.push(a);
        queue.push(b);
        queue.push(c);

        assert!(queue.remove(b));
        assert!(!queue.remove(b));
        assert!(!queue.contains(b));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![a, c]);

        // Removed id may be queued again at the tail
        assert!(queue.push(b));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![a, c, b]);
    }
}
