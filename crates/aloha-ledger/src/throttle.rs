//! Global admission cooldowns.
//!
//! One gate for new surfers, one for new sessions. Both are network-wide:
//! every caller shares the same cooldown, which caps how fast identities or
//! sessions can be minted regardless of how many accounts an attacker holds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which admission gate rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Surfer,
    Session,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Surfer => f.write_str("surfer"),
            Gate::Session => f.write_str("session"),
        }
    }
}

/// A single cooldown gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    /// Minimum seconds between accepted admissions
    pub interval: u64,
    /// Time of the last accepted admission, `None` before the first
    pub last_accepted: Option<u64>,
}

impl Cooldown {
    pub fn new(interval: u64) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Earliest time the next admission is allowed.
    pub fn ready_at(&self) -> u64 {
        match self.last_accepted {
            Some(last) => last.saturating_add(self.interval),
            None => 0,
        }
    }

    /// Whether an admission at `now` would pass.
    pub fn is_open(&self, now: u64) -> bool {
        now >= self.ready_at()
    }

    /// Record an accepted admission.
    pub fn record(&mut self, now: u64) {
        self.last_accepted = Some(now);
    }
}

/// Both admission gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionThrottle {
    pub surfers: Cooldown,
    pub sessions: Cooldown,
}

impl AdmissionThrottle {
    pub fn new(surfer_interval: u64, session_interval: u64) -> Self {
        Self {
            surfers: Cooldown::new(surfer_interval),
            sessions: Cooldown::new(session_interval),
        }
    }

    fn gate(&self, gate: Gate) -> &Cooldown {
        match gate {
            Gate::Surfer => &self.surfers,
            Gate::Session => &self.sessions,
        }
    }

    fn gate_mut(&mut self, gate: Gate) -> &mut Cooldown {
        match gate {
            Gate::Surfer => &mut self.surfers,
            Gate::Session => &mut self.sessions,
        }
    }

    /// Fail with `ThrottleActive` if `gate` is still cooling down.
    pub fn check(&self, gate: Gate, now: u64) -> Result<()> {
        let cooldown = self.gate(gate);
        if cooldown.is_open(now) {
            Ok(())
        } else {
            Err(Error::ThrottleActive {
                gate,
                ready_at: cooldown.ready_at(),
            })
        }
    }

    /// Restart the cooldown for `gate`. Call only after the admission it
    /// guards has succeeded.
    pub fn record(&mut self, gate: Gate, now: u64) {
        self.gate_mut(gate).record(now);
    }

    pub fn set_interval(&mut self, gate: Gate, interval: u64) {
        self.gate_mut(gate).interval = interval;
    }
}
