//! FIFO waitlist for a full fez.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Users waiting for a seat, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Waitlist {
    queue: VecDeque<Uuid>,
}

impl Waitlist {
    /// Append to the tail. Returns false if the user is already queued.
    pub fn push(&mut self, user_id: Uuid) -> bool {
        if self.contains(user_id) {
            return false;
        }
        self.queue.push_back(user_id);
        true
    }

    pub fn pop_front(&mut self) -> Option<Uuid> {
        self.queue.pop_front()
    }

    /// Drop every entry for a user. Returns true if anything was removed.
    pub fn remove(&mut self, user_id: Uuid) -> bool {
        let before = self.queue.len();
        self.queue.retain(|id| *id != user_id);
        self.queue.len() != before
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.queue.contains(&user_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.queue.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut waitlist = Waitlist::default();
        waitlist.push(a);
        waitlist.push(b);
        waitlist.push(c);
        assert_eq!(waitlist.pop_front(), Some(a));
        assert_eq!(waitlist.pop_front(), Some(b));
        assert_eq!(waitlist.iter().collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_push_is_idempotent() {
        let a = Uuid::new_v4();
        let mut waitlist = Waitlist::default();
        assert!(waitlist.push(a));
        assert!(!waitlist.push(a));
        assert_eq!(waitlist.len(), 1);
    }

    #[test]
    fn test_remove() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut waitlist = Waitlist::default();
        waitlist.push(a);
        waitlist.push(b);
        assert!(waitlist.remove(a));
        assert!(!waitlist.remove(a));
        assert_eq!(waitlist.pop_front(), Some(b));
        assert!(waitlist.is_empty());
    }
}
