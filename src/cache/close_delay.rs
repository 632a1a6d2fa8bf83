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

//! Keeps cache entries open for a while after their last user leaves.
//!
//! Views that are opened and closed in quick succession (a screen that is
//! rebuilt, a worker that polls) would otherwise reload the element every
//! time. [`DelayedClose`] holds one extra upstream reference per key and only
//! returns it once the key has had no users for the configured delay.

use crate::cache::{CacheUser, SharedListener};
use crate::clock::{MonotonicClock, SystemClock};
use crate::error::{PacedError, Result};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MIN_WIPE_WAIT: Duration = Duration::from_millis(10);
const POISONED: &str = "close-delay state poisoned";

struct WipeState<K> {
    /// Keys with at least one user. A key is in `users` or `wipe_at`, never both.
    users: HashMap<K, usize>,
    wipe_at: HashMap<K, u64>,
    /// Keys whose extra upstream reference was taken successfully.
    extra_held: HashSet<K>,
    /// Keys whose extra upstream open is in flight.
    extra_opening: HashSet<K>,
    stopped: bool,
}

impl<K: Eq + Hash> WipeState<K> {
    fn drop_user(&mut self, key: &K) {
        if let Some(count) = self.users.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.users.remove(key);
            }
        }
    }

    fn take_wipe(&mut self, key: &K) {
        self.wipe_at.remove(key);
        self.extra_held.remove(key);
    }
}

struct Shared<K, V, C> {
    inner: C,
    delay_ms: u64,
    clock: Arc<dyn MonotonicClock>,
    state: Mutex<WipeState<K>>,
    wake: Condvar,
    _values: PhantomData<fn() -> V>,
}

impl<K, V, C> Shared<K, V, C>
where
    K: Eq + Hash + Clone + Debug,
    C: CacheUser<K, V>,
{
    fn lock_state(&self) -> MutexGuard<'_, WipeState<K>> {
        self.state.lock().expect(POISONED)
    }

    /// Drops one local user; the last one schedules the upstream close.
    fn release_user(&self, key: &K) -> Result<()> {
        let mut state = self.lock_state();
        let count = state
            .users
            .get_mut(key)
            .ok_or_else(|| PacedError::CacheNotOpen(format!("{key:?}")))?;

        *count -= 1;
        if *count == 0 {
            state.users.remove(key);
            if !state.extra_held.contains(key) {
                debug!("Last user of {key:?} left without an extra reference to return");
                return Ok(());
            }
            let wipe_at = self.clock.now_millis().saturating_add(self.delay_ms);
            debug!("Scheduling close of {key:?} at {wipe_at}ms");
            state.wipe_at.insert(key.clone(), wipe_at);
            self.wake.notify_all();
        }
        Ok(())
    }

    fn close_upstream(&self, keys: Vec<K>) {
        for key in keys {
            debug!("Closing idle cache element {key:?}");
            if let Err(err) = self.inner.close(&key, None) {
                warn!("Failed to close idle cache element {key:?}: {err}");
            }
        }
    }

    fn run_wiper(&self) {
        let mut state = self.lock_state();
        loop {
            if state.stopped {
                let pending: Vec<K> = state.wipe_at.drain().map(|(key, _)| key).collect();
                for key in &pending {
                    state.extra_held.remove(key);
                }
                drop(state);
                self.close_upstream(pending);
                return;
            }

            let now = self.clock.now_millis();
            let due: Vec<K> = state
                .wipe_at
                .iter()
                .filter(|(_, wipe_at)| **wipe_at <= now)
                .map(|(key, _)| key.clone())
                .collect();

            if !due.is_empty() {
                for key in &due {
                    state.take_wipe(key);
                }
                drop(state);
                self.close_upstream(due);
                state = self.lock_state();
                continue;
            }

            state = match state.wipe_at.values().min().copied() {
                Some(next) => {
                    let wait = Duration::from_millis(next - now).max(MIN_WIPE_WAIT);
                    self.wake.wait_timeout(state, wait).expect(POISONED).0
                }
                None => self.wake.wait(state).expect(POISONED),
            };
        }
    }
}

/// [`CacheUser`] wrapper that delays the final close of each key.
///
/// The first open of a key also takes one extra upstream reference; the
/// wiper returns it once the key has been idle for the delay. A key whose
/// extra open failed is retried by its next opener.
///
/// # Panics
///
/// `open`, `close` and `pending_closes` panic if the wipe state was poisoned.
pub struct DelayedClose<K, V, C>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: 'static,
    C: CacheUser<K, V> + Send + Sync + 'static,
{
    shared: Arc<Shared<K, V, C>>,
    wiper: Option<JoinHandle<()>>,
}

impl<K, V, C> DelayedClose<K, V, C>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: 'static,
    C: CacheUser<K, V> + Send + Sync + 'static,
{
    pub fn new(inner: C, delay: Duration) -> Result<Self> {
        Self::with_clock(inner, delay, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(inner: C, delay: Duration, clock: Arc<dyn MonotonicClock>) -> Result<Self> {
        let shared = Arc::new(Shared {
            inner,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            clock,
            state: Mutex::new(WipeState {
                users: HashMap::new(),
                wipe_at: HashMap::new(),
                extra_held: HashSet::new(),
                extra_opening: HashSet::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
            _values: PhantomData,
        });

        let worker = shared.clone();
        let wiper = thread::Builder::new()
            .name("paced-close-delay".to_string())
            .spawn(move || worker.run_wiper())?;

        Ok(Self {
            shared,
            wiper: Some(wiper),
        })
    }

    pub fn inner(&self) -> &C {
        &self.shared.inner
    }

    /// Keys whose upstream close is scheduled but has not happened yet.
    pub fn pending_closes(&self) -> usize {
        self.shared.lock_state().wipe_at.len()
    }
}

impl<K, V, C> CacheUser<K, V> for DelayedClose<K, V, C>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: 'static,
    C: CacheUser<K, V> + Send + Sync + 'static,
{
    fn open(&self, key: &K, listener: Option<SharedListener<K, V>>) -> Result<V> {
        let take_extra = {
            let mut state = self.shared.lock_state();
            if state.wipe_at.remove(key).is_some() {
                debug!("Reopened {key:?} before its delayed close");
                state.users.insert(key.clone(), 1);
                false
            } else {
                *state.users.entry(key.clone()).or_insert(0) += 1;
                !state.extra_held.contains(key) && state.extra_opening.insert(key.clone())
            }
        };

        if take_extra {
            let opened = self.shared.inner.open(key, None);
            let mut state = self.shared.lock_state();
            state.extra_opening.remove(key);
            match opened {
                Ok(_) => {
                    state.extra_held.insert(key.clone());
                }
                Err(err) => {
                    state.drop_user(key);
                    return Err(err);
                }
            }
        }

        match self.shared.inner.open(key, listener) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(release_err) = self.shared.release_user(key) {
                    warn!("Failed to roll back open of {key:?}: {release_err}");
                }
                Err(err)
            }
        }
    }

    fn close(&self, key: &K, listener: Option<&SharedListener<K, V>>) -> Result<()> {
        self.shared.release_user(key)?;
        self.shared.inner.close(key, listener)
    }
}

impl<K, V, C> Drop for DelayedClose<K, V, C>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: 'static,
    C: CacheUser<K, V> + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.stopped = true;
        }
        self.shared.wake.notify_all();
        if let Some(wiper) = self.wiper.take()
            && wiper.join().is_err()
        {
            warn!("Close-delay worker panicked");
        }
    }
}
