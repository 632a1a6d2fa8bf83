// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A mutex that also spaces out consecutive critical sections.
//!
//! [`RateLimitedMutex`] serializes callers like an ordinary mutex, and in
//! addition refuses to start a new critical section until the configured
//! cooldown has elapsed since the previous one *started*. Callers are
//! admitted in arrival order.
//!
//! Admission and release touch one piece of shared state under a single
//! [`Mutex`]; waiting uses a [`Condvar`], so the state lock is released for
//! the duration of every wait. The protected operation itself runs with no
//! lock held.
//!
//! Two timestamps are tracked separately:
//!
//! * the *spacing anchor*, the start time of the most recent admission, which
//!   drives the cooldown;
//! * the *open slot*, the token and start time of the admission that has not
//!   released yet. Release clears the slot only when it still carries the
//!   releasing caller's token, so a stale holder can never free a slot that a
//!   later caller owns.
//!
//! If the clock reads earlier than the spacing anchor (a monotonic clock that
//! restarted), the cooldown is skipped for that admission instead of
//! producing a huge wait.

use crate::clock::{MonotonicClock, SystemClock};
use crate::locking::cooldown::{CooldownDelay, DEFAULT_COOLDOWN, cooldown_delay};
use crate::locking::guard::AdmissionGuard;
use crate::locking::observer::{AdmissionObserver, AdmissionRecord, LogAdmissionObserver};
use log::trace;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const POISONED: &str = "rate limited mutex state poisoned";

/// Identity of one admission. Tokens are unique per mutex and increase in
/// admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdmissionToken(u64);

impl AdmissionToken {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AdmissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How long an admitted caller may keep the slot before others stop waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldPolicy {
    /// The next admission waits for the holder's release, however long it takes.
    #[default]
    Exclusive,
    /// The next admission waits for the holder's release or for the lease to
    /// run out, whichever comes first.
    Lease(Duration),
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    token: AdmissionToken,
    started_at: u64,
}

#[derive(Debug, Default)]
struct State {
    next_ticket: u64,
    serving: u64,
    next_token: u64,
    last_start: Option<u64>,
    holder: Option<Holder>,
}

impl State {
    fn queued(&self) -> u64 {
        self.next_ticket.wrapping_sub(self.serving)
    }
}

enum HolderWait {
    Indefinite,
    For(Duration),
    Expired,
}

pub struct RateLimitedMutex {
    state: Mutex<State>,
    changed: Condvar,
    clock: Arc<dyn MonotonicClock>,
    cooldown_ms: u64,
    hold: HoldPolicy,
    observer: Arc<dyn AdmissionObserver>,
}

impl RateLimitedMutex {
    /// System clock, one second of spacing, exclusive holds.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self::builder().cooldown(cooldown).build()
    }

    pub fn builder() -> RateLimitedMutexBuilder {
        RateLimitedMutexBuilder::default()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn hold_policy(&self) -> HoldPolicy {
        self.hold
    }

    /// Start timestamp of the most recent admission.
    pub fn last_start(&self) -> Option<u64> {
        self.lock_state().last_start
    }

    /// Token of the admission currently occupying the slot.
    pub fn holder(&self) -> Option<AdmissionToken> {
        self.lock_state().holder.map(|holder| holder.token)
    }

    /// Number of callers currently inside the admission sequence.
    pub fn queued(&self) -> usize {
        usize::try_from(self.lock_state().queued()).unwrap_or(usize::MAX)
    }

    /// Runs `operation` once admitted and returns its result unchanged.
    ///
    /// The slot is released when `operation` returns or unwinds.
    ///
    /// # Panics
    ///
    /// Panics if the internal state lock was poisoned, and resumes any panic
    /// raised by `operation` after releasing.
    pub fn run_exclusive<R, F>(&self, operation: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.admit();
        operation()
    }

    /// Runs `operation` only if admission is possible without waiting.
    pub fn try_run_exclusive<R, F>(&self, operation: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        let _guard = self.try_admit()?;
        Some(operation())
    }

    /// Blocks until the caller is admitted and returns a guard owning the slot.
    pub fn admit(&self) -> AdmissionGuard<'_> {
        let requested = Instant::now();
        let mut state = self.lock_state();

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        while state.serving != ticket {
            state = self.changed.wait(state).expect(POISONED);
        }

        let mut rounds = 0usize;
        let (now, clock_regressed, took_over) = loop {
            rounds += 1;
            let now = self.clock.now_millis();

            let mut took_over = false;
            if let Some(holder) = state.holder {
                match self.holder_wait(holder, now) {
                    HolderWait::Indefinite => {
                        trace!("Ticket {ticket} waiting for holder {} to release", holder.token);
                        state = self.changed.wait(state).expect(POISONED);
                        continue;
                    }
                    HolderWait::For(remaining) => {
                        trace!(
                            "Ticket {ticket} waiting up to {}ms for holder {}",
                            remaining.as_millis(),
                            holder.token
                        );
                        state = self.changed.wait_timeout(state, remaining).expect(POISONED).0;
                        continue;
                    }
                    HolderWait::Expired => took_over = true,
                }
            }

            match cooldown_delay(state.last_start, now, self.cooldown_ms) {
                CooldownDelay::Wait(ms) => {
                    trace!("Ticket {ticket} cooling down for {ms}ms (round {rounds})");
                    state = self
                        .changed
                        .wait_timeout(state, Duration::from_millis(ms))
                        .expect(POISONED)
                        .0;
                }
                CooldownDelay::ClockRegressed => break (now, true, took_over),
                CooldownDelay::Ready => break (now, false, took_over),
            }
        };

        let token = Self::commit(&mut state, now);
        state.serving = state.serving.wrapping_add(1);
        drop(state);
        self.changed.notify_all();

        self.admitted(AdmissionRecord {
            token,
            started_at: now,
            waited: requested.elapsed(),
            clock_regressed,
            took_over,
        })
    }

    /// Admits the caller only if nobody is queued, the slot is free (or its
    /// lease expired) and the cooldown has elapsed.
    pub fn try_admit(&self) -> Option<AdmissionGuard<'_>> {
        let requested = Instant::now();
        let mut state = self.lock_state();

        if state.queued() != 0 {
            return None;
        }

        let now = self.clock.now_millis();
        let took_over = match state.holder {
            Some(holder) => match self.holder_wait(holder, now) {
                HolderWait::Expired => true,
                HolderWait::Indefinite | HolderWait::For(_) => return None,
            },
            None => false,
        };

        let clock_regressed = match cooldown_delay(state.last_start, now, self.cooldown_ms) {
            CooldownDelay::Wait(_) => return None,
            CooldownDelay::ClockRegressed => true,
            CooldownDelay::Ready => false,
        };

        let token = Self::commit(&mut state, now);
        drop(state);

        Some(self.admitted(AdmissionRecord {
            token,
            started_at: now,
            waited: requested.elapsed(),
            clock_regressed,
            took_over,
        }))
    }

    /// Clears the slot if `token` still owns it. Returns whether it did.
    pub(crate) fn release(&self, token: AdmissionToken) -> bool {
        let cleared = {
            let mut state = self.lock_state();
            match state.holder {
                Some(holder) if holder.token == token => {
                    state.holder = None;
                    true
                }
                _ => false,
            }
        };

        if cleared {
            self.changed.notify_all();
        }
        self.observer.on_released(token, cleared);
        cleared
    }

    fn commit(state: &mut State, now: u64) -> AdmissionToken {
        let token = AdmissionToken(state.next_token);
        state.next_token = state.next_token.wrapping_add(1);
        state.holder = Some(Holder {
            token,
            started_at: now,
        });
        state.last_start = Some(now);
        token
    }

    fn admitted(&self, record: AdmissionRecord) -> AdmissionGuard<'_> {
        let guard = AdmissionGuard::new(self, record);
        self.observer.on_admitted(guard.record());
        guard
    }

    fn holder_wait(&self, holder: Holder, now: u64) -> HolderWait {
        match self.hold {
            HoldPolicy::Exclusive => HolderWait::Indefinite,
            HoldPolicy::Lease(lease) => {
                let held = Duration::from_millis(now.saturating_sub(holder.started_at));
                match lease.checked_sub(held) {
                    Some(remaining) if !remaining.is_zero() => HolderWait::For(remaining),
                    _ => HolderWait::Expired,
                }
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect(POISONED)
    }
}

impl Default for RateLimitedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimitedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedMutex")
            .field("cooldown_ms", &self.cooldown_ms)
            .field("hold", &self.hold)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RateLimitedMutex`].
pub struct RateLimitedMutexBuilder {
    clock: Option<Arc<dyn MonotonicClock>>,
    cooldown: Duration,
    hold: HoldPolicy,
    observer: Option<Arc<dyn AdmissionObserver>>,
}

impl Default for RateLimitedMutexBuilder {
    fn default() -> Self {
        Self {
            clock: None,
            cooldown: DEFAULT_COOLDOWN,
            hold: HoldPolicy::Exclusive,
            observer: None,
        }
    }
}

impl RateLimitedMutexBuilder {
    pub fn clock<C: MonotonicClock + 'static>(self, clock: C) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    pub fn shared_clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn hold_policy(mut self, hold: HoldPolicy) -> Self {
        self.hold = hold;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn AdmissionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> RateLimitedMutex {
        RateLimitedMutex {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            cooldown_ms: u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX),
            hold: self.hold,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(LogAdmissionObserver)),
        }
    }
}
