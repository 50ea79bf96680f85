//! Which tracking session is authoritative per vehicle, plus a bounded memory
//! of recently stopped sessions used to reject late stragglers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

use crate::identifier::VehicleId;
use crate::models::SkipReason;

/// The session a vehicle is currently reporting under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSession {
    /// A client that does not send session ids.
    Legacy,
    Session(String),
}

impl ActiveSession {
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Legacy => None,
            Self::Session(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(SkipReason),
}

/// Recently terminated session ids, pruned to the most recent `retain`
/// entries (by insertion) whenever more than `capacity` are held.
#[derive(Debug)]
pub struct TerminatedSessions {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
    retain: usize,
}

impl TerminatedSessions {
    #[must_use]
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
            retain: retain.min(capacity),
        }
    }

    /// Remember `session_id`. Returns false if it was already present.
    pub fn insert(&mut self, session_id: &str) -> bool {
        if !self.members.insert(session_id.to_string()) {
            return false;
        }
        self.order.push_back(session_id.to_string());

        if self.order.len() > self.capacity {
            let excess = self.order.len() - self.retain;
            for evicted in self.order.drain(..excess) {
                self.members.remove(&evicted);
            }
            tracing::debug!(evicted = excess, "pruned terminated sessions");
        }
        true
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.members.contains(session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    active: DashMap<VehicleId, ActiveSession>,
    terminated: Mutex<TerminatedSessions>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            active: DashMap::new(),
            terminated: Mutex::new(TerminatedSessions::new(capacity, retain)),
        }
    }

    /// Decide whether a sample may proceed and update the vehicle's session
    /// state accordingly. Callers serialize calls per vehicle.
    pub fn accept(
        &self, vehicle: &VehicleId, session_id: Option<&str>, is_tracking: bool,
    ) -> Verdict {
        if !is_tracking {
            self.active.remove(vehicle);
            if let Some(id) = session_id {
                self.terminated().insert(id);
                tracing::debug!(vehicle = %vehicle, session = id, "session terminated");
            }
            return Verdict::Accept;
        }

        let Some(id) = session_id else {
            self.active.insert(vehicle.clone(), ActiveSession::Legacy);
            return Verdict::Accept;
        };

        if self.is_terminated(id) {
            tracing::debug!(vehicle = %vehicle, session = id, "straggler from terminated session");
            return Verdict::Reject(SkipReason::TerminatedSession);
        }

        self.active.insert(vehicle.clone(), ActiveSession::Session(id.to_string()));
        Verdict::Accept
    }

    #[must_use]
    pub fn active_session(&self, vehicle: &VehicleId) -> Option<ActiveSession> {
        self.active.get(vehicle).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn is_terminated(&self, session_id: &str) -> bool {
        self.terminated().contains(session_id)
    }

    #[must_use]
    pub fn terminated_len(&self) -> usize {
        self.terminated().len()
    }

    fn terminated(&self) -> std::sync::MutexGuard<'_, TerminatedSessions> {
        self.terminated.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
