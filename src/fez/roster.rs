//! Seat roster for a single fez.
//!
//! Positions never shift: a vacated seat is either refilled in place or left
//! as [`Slot::Available`], so seat 0 stays the owner's original seat for the
//! life of the fez.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Occupied(Uuid),
    Available,
}

impl Slot {
    pub fn occupant(&self) -> Option<Uuid> {
        match self {
            Slot::Occupied(id) => Some(*id),
            Slot::Available => None,
        }
    }
}

/// Ordered sequence of seats.
///
/// Stored as a JSON array where `null` marks an available seat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Option<Uuid>>", into = "Vec<Option<Uuid>>")]
pub struct Roster {
    slots: Vec<Slot>,
}

impl Roster {
    /// A roster holding only the owner, in seat 0.
    pub fn with_owner(owner_id: Uuid) -> Self {
        Self {
            slots: vec![Slot::Occupied(owner_id)],
        }
    }

    /// A roster seating each distinct participant in order.
    pub fn from_participants(participants: impl IntoIterator<Item = Uuid>) -> Self {
        let mut roster = Self::default();
        for id in participants {
            if !roster.contains(id) {
                roster.slots.push(Slot::Occupied(id));
            }
        }
        roster
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.occupant().is_some()).count()
    }

    pub fn occupants(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.slots.iter().filter_map(Slot::occupant)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.position_of(user_id).is_some()
    }

    pub fn position_of(&self, user_id: Uuid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| *s == Slot::Occupied(user_id))
    }

    /// Lowest available position, if any.
    pub fn first_available(&self) -> Option<usize> {
        self.slots.iter().position(|s| *s == Slot::Available)
    }

    /// Whether a seat can be taken without waitlisting. `max_capacity == 0` means unlimited.
    pub fn has_free_seat(&self, max_capacity: u32) -> bool {
        self.first_available().is_some()
            || max_capacity == 0
            || self.slots.len() < max_capacity as usize
    }

    /// Seat a user, reusing the lowest available position before growing.
    ///
    /// Returns the seat position, or `None` when the roster is at capacity.
    pub fn seat(&mut self, user_id: Uuid, max_capacity: u32) -> Option<usize> {
        if !self.has_free_seat(max_capacity) {
            return None;
        }
        if let Some(position) = self.first_available() {
            self.slots[position] = Slot::Occupied(user_id);
            return Some(position);
        }
        self.slots.push(Slot::Occupied(user_id));
        Some(self.slots.len() - 1)
    }

    /// Mark a user's seat available. Returns the freed position.
    pub fn vacate(&mut self, user_id: Uuid) -> Option<usize> {
        let position = self.position_of(user_id)?;
        self.slots[position] = Slot::Available;
        Some(position)
    }

    /// Put a user into a specific available position.
    pub fn fill(&mut self, position: usize, user_id: Uuid) {
        debug_assert_eq!(self.slots.get(position), Some(&Slot::Available));
        self.slots[position] = Slot::Occupied(user_id);
    }
}

impl From<Vec<Option<Uuid>>> for Roster {
    fn from(stored: Vec<Option<Uuid>>) -> Self {
        Self {
            slots: stored
                .into_iter()
                .map(|s| s.map_or(Slot::Available, Slot::Occupied))
                .collect(),
        }
    }
}

impl From<Roster> for Vec<Option<Uuid>> {
    fn from(roster: Roster) -> Self {
        roster.slots.iter().map(Slot::occupant).collect()
    }
}
