//! Armed-slot timers with generation tokens.
//!
//! A timer is "set" exactly when its slot holds an armed entry. Each arm hands
//! out a fresh token; a fire carrying any other token is stale and ignored.

use std::time::{Duration, Instant};

use crate::refresh::types::TimerKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy)]
struct Armed {
    token: TimerToken,
    deadline: Instant,
}

#[derive(Debug, Default)]
pub struct Timers {
    slots: [Option<Armed>; 4],
    generation: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer of `kind`. Any earlier token becomes stale.
    pub fn arm(&mut self, kind: TimerKind, now: Instant, delay: Duration) -> TimerToken {
        self.generation += 1;
        let token = TimerToken(self.generation);
        self.slots[kind.slot()] = Some(Armed {
            token,
            deadline: now + delay,
        });
        token
    }

    /// Disarm `kind`. Returns whether it was armed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots[kind.slot()].take().is_some()
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    pub fn token(&self, kind: TimerKind) -> Option<TimerToken> {
        self.slots[kind.slot()].map(|a| a.token)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.slot()].map(|a| a.deadline)
    }

    /// Consume a fire. Only the currently armed token is accepted, and
    /// accepting it disarms the slot.
    pub fn fire(&mut self, kind: TimerKind, token: TimerToken) -> bool {
        let slot = &mut self.slots[kind.slot()];
        if slot.is_some_and(|armed| armed.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|a| a.deadline).min()
    }

    /// Timers whose deadline has passed, earliest first.
    pub fn due(&self, now: Instant) -> Vec<(TimerKind, TimerToken)> {
        let mut due: Vec<_> = TimerKind::ALL
            .iter()
            .filter_map(|&kind| {
                self.slots[kind.slot()]
                    .filter(|a| a.deadline <= now)
                    .map(|a| (a.deadline, kind, a.token))
            })
            .collect();
        due.sort_by_key(|(deadline, _, _)| *deadline);
        due.into_iter().map(|(_, kind, token)| (kind, token)).collect()
    }
}
