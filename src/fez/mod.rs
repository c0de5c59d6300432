//! Fez membership core.
//!
//! A fez is a capacity-bounded group with an ordered seat roster and a FIFO
//! waitlist. All mutation goes through [`MembershipEngine`]; the listing views
//! live in [`ListingService`].

mod blocks;
mod engine;
mod listing;
mod roster;
mod waitlist;

pub use blocks::*;
pub use engine::*;
pub use listing::*;
pub use roster::*;
pub use waitlist::*;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::FezType;

/// Validated input for creating a fez.
#[derive(Debug, Clone)]
pub struct NewFez {
    pub fez_type: FezType,
    pub title: String,
    pub info: String,
    pub location: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// Extra participants of a closed fez. Ignored for other types.
    pub participants: Vec<Uuid>,
}

/// A fez and its membership state.
#[derive(Debug, Clone)]
pub struct Fez {
    pub id: Uuid,
    pub fez_type: FezType,
    pub title: String,
    pub info: String,
    pub location: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Advisory only; never enforced.
    pub min_capacity: u32,
    /// 0 means unlimited.
    pub max_capacity: u32,
    pub owner_id: Uuid,
    pub roster: Roster,
    pub waitlist: Waitlist,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a self-join landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Seated(usize),
    Waitlisted(usize),
}

/// What happened to a freed seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Promoted { position: usize, user_id: Uuid },
    Opened { position: usize },
}

impl Fez {
    /// Build a new fez owned by `owner_id`.
    pub fn new(owner_id: Uuid, draft: NewFez) -> Self {
        let now = Utc::now();
        let roster = if draft.fez_type == FezType::Closed {
            Roster::from_participants(std::iter::once(owner_id).chain(draft.participants))
        } else {
            Roster::with_owner(owner_id)
        };

        Self {
            id: Uuid::new_v4(),
            fez_type: draft.fez_type,
            title: draft.title,
            info: draft.info,
            location: draft.location,
            start_time: draft.start_time,
            end_time: draft.end_time,
            min_capacity: draft.min_capacity,
            max_capacity: draft.max_capacity,
            owner_id,
            roster,
            waitlist: Waitlist::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.fez_type == FezType::Closed
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.roster.contains(user_id)
    }

    /// Joinable without waitlisting, judged by occupied seats.
    pub fn is_open(&self) -> bool {
        !self.is_closed()
            && (self.max_capacity == 0
                || self.roster.occupied_count() < self.max_capacity as usize)
    }

    /// Whether `viewer` may see this fez at all, given the users they are block-related to.
    pub fn is_visible_to(&self, viewer: Uuid, block_set: &HashSet<Uuid>) -> bool {
        if block_set.contains(&self.owner_id) {
            return false;
        }
        !self.is_closed() || self.is_participant(viewer)
    }

    /// Whether any seated user is block-related to the caller.
    pub fn seats_anyone_in(&self, block_set: &HashSet<Uuid>) -> bool {
        self.roster.occupants().any(|id| block_set.contains(&id))
    }

    /// Seat a user, or queue them when every seat is taken.
    pub(crate) fn seat_or_enqueue(&mut self, user_id: Uuid) -> JoinOutcome {
        match self.roster.seat(user_id, self.max_capacity) {
            Some(position) => {
                self.waitlist.remove(user_id);
                JoinOutcome::Seated(position)
            }
            None => {
                self.waitlist.push(user_id);
                JoinOutcome::Waitlisted(self.waitlist.len() - 1)
            }
        }
    }

    /// Seat a user without ever queueing them.
    pub(crate) fn seat(&mut self, user_id: Uuid) -> Option<usize> {
        let position = self.roster.seat(user_id, self.max_capacity)?;
        self.waitlist.remove(user_id);
        Some(position)
    }

    /// Free a user's seat and hand it to the head of the waitlist, if any.
    ///
    /// The departing user is purged from the waitlist first so they can never
    /// be promoted back into the seat they just left.
    pub(crate) fn release(&mut self, user_id: Uuid) -> Option<Release> {
        let position = self.roster.vacate(user_id)?;
        self.waitlist.remove(user_id);
        match self.waitlist.pop_front() {
            Some(next) => {
                self.roster.fill(position, next);
                Some(Release::Promoted {
                    position,
                    user_id: next,
                })
            }
            None => Some(Release::Opened { position }),
        }
    }

    /// Every user id referenced by this fez, for username lookup.
    pub fn referenced_users(&self) -> Vec<Uuid> {
        let mut ids = vec![self.owner_id];
        ids.extend(self.roster.occupants());
        ids.extend(self.waitlist.iter());
        ids
    }
}
