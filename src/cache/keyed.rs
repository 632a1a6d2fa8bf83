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

use crate::cache::{CacheSource, CacheUser, SharedListener, same_listener};
use crate::error::{PacedError, Result};
use crate::locking::RateLimitedMutex;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const POISONED: &str = "data cache state poisoned";

struct ListenerSlot<K, V> {
    listener: SharedListener<K, V>,
    closed: Mutex<bool>,
}

impl<K, V> ListenerSlot<K, V> {
    fn new(listener: SharedListener<K, V>) -> Arc<Self> {
        Arc::new(Self {
            listener,
            closed: Mutex::new(false),
        })
    }

    /// Waits for an in-flight notification to finish, then blocks new ones.
    fn close(&self) {
        *self.closed.lock().expect(POISONED) = true;
    }

    fn notify(&self, key: &K, old_value: &V, new_value: &V) {
        let closed = self.closed.lock().expect(POISONED);
        if !*closed {
            self.listener.on_element_updated(key, old_value, new_value);
        }
    }
}

struct Element<K, I, V> {
    id: u64,
    value: Arc<I>,
    users: usize,
    listeners: Vec<Arc<ListenerSlot<K, V>>>,
}

impl<K, I, V> Element<K, I, V> {
    fn attach(&mut self, listener: Option<SharedListener<K, V>>) {
        let Some(listener) = listener else {
            return;
        };
        if !self
            .listeners
            .iter()
            .any(|slot| same_listener(&slot.listener, &listener))
        {
            self.listeners.push(ListenerSlot::new(listener));
        }
    }
}

type ElementMap<K, S> =
    HashMap<K, Element<K, <S as CacheSource<K>>::Item, <S as CacheSource<K>>::View>>;

/// Keyed cache of items loaded from a [`CacheSource`].
///
/// Each key holds one element with a user count. `open` adds a user (and
/// refreshes an existing element), `close` removes one, and the element is
/// disposed when the last user leaves. `refresh` updates every element and
/// tells listeners about values that changed.
///
/// # Panics
///
/// Every method panics if the element map was poisoned by a panic inside a
/// [`CacheSource`] or [`CacheListener`](crate::cache::CacheListener) call.
pub struct DataCache<K, S>
where
    S: CacheSource<K>,
{
    source: S,
    elements: Mutex<ElementMap<K, S>>,
    next_id: AtomicU64,
    throttle: RateLimitedMutex,
}

impl<K, S> DataCache<K, S>
where
    K: Eq + Hash + Clone + Debug,
    S: CacheSource<K>,
{
    pub fn new(source: S) -> Self {
        Self::with_throttle(source, RateLimitedMutex::new())
    }

    pub fn with_throttle(source: S, throttle: RateLimitedMutex) -> Self {
        Self {
            source,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            throttle,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn throttle(&self) -> &RateLimitedMutex {
        &self.throttle
    }

    /// Current user count of `key`; zero when it is not cached.
    pub fn users(&self, key: &K) -> usize {
        self.lock_elements()
            .get(key)
            .map_or(0, |element| element.users)
    }

    pub fn len(&self) -> usize {
        self.lock_elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_elements().is_empty()
    }

    /// Opens `key`, loading it if needed, and returns its current view.
    ///
    /// `listener` is attached at most once per key, however often it is
    /// passed.
    ///
    /// # Panics
    ///
    /// Panics if the element map or the throttle state was poisoned.
    pub fn open(&self, key: &K, listener: Option<SharedListener<K, S::View>>) -> Result<S::View> {
        self.source
            .wrap(|| self.throttle.run_exclusive(|| self.open_exclusive(key, listener)))
    }

    /// Updates every cached element.
    ///
    /// A failing element does not stop the others; the first failure is
    /// returned once all elements were tried.
    ///
    /// # Panics
    ///
    /// Panics if the element map or the throttle state was poisoned.
    pub fn refresh(&self) -> Result<()> {
        self.source.wrap(|| {
            self.throttle.run_exclusive(|| {
                let snapshot: Vec<(K, u64, Arc<S::Item>)> = self
                    .lock_elements()
                    .iter()
                    .map(|(key, element)| (key.clone(), element.id, element.value.clone()))
                    .collect();

                let mut first_error = None;
                for (key, id, value) in snapshot {
                    if let Err(err) = self.update_element(&key, id, value) {
                        warn!("Failed to refresh cache element {key:?}: {err}");
                        first_error.get_or_insert(err);
                    }
                }

                match first_error {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            })
        })
    }

    /// Removes one user of `key` and detaches `listener` from it.
    ///
    /// # Panics
    ///
    /// Panics if the element map was poisoned.
    pub fn close(&self, key: &K, listener: Option<&SharedListener<K, S::View>>) -> Result<()> {
        let mut elements = self.lock_elements();
        let element = elements
            .get_mut(key)
            .ok_or_else(|| PacedError::CacheNotOpen(format!("{key:?}")))?;

        if let Some(listener) = listener {
            element.listeners.retain(|slot| {
                if same_listener(&slot.listener, listener) {
                    slot.close();
                    false
                } else {
                    true
                }
            });
        }

        if element.users > 1 {
            element.users -= 1;
            return Ok(());
        }

        if !element.listeners.is_empty() {
            return Err(PacedError::CacheInconsistent(format!(
                "last user of {key:?} closed with {} listener(s) still attached",
                element.listeners.len()
            )));
        }

        if let Some(element) = elements.remove(key) {
            debug!("Disposing cache element {key:?}");
            self.source.dispose_item(key, &element.value);
        }
        Ok(())
    }

    fn open_exclusive(
        &self,
        key: &K,
        listener: Option<SharedListener<K, S::View>>,
    ) -> Result<S::View> {
        let existing = self.lock_elements().get_mut(key).map(|element| {
            element.users += 1;
            (element.id, element.value.clone())
        });

        if let Some((id, value)) = existing {
            if let Err(err) = self.update_element(key, id, value) {
                if let Err(close_err) = self.close(key, None) {
                    warn!("Failed to roll back open of {key:?}: {close_err}");
                }
                return Err(err);
            }

            let mut elements = self.lock_elements();
            let element = elements
                .get_mut(key)
                .filter(|element| element.id == id)
                .ok_or_else(|| {
                    PacedError::CacheInconsistent(format!(
                        "element {key:?} was replaced while it had users"
                    ))
                })?;
            element.attach(listener);
            return Ok(self.source.view(&element.value));
        }

        let value = self.source.open_item(key)?;

        let mut elements = self.lock_elements();
        if let Some(current) = elements.get_mut(key) {
            debug!("Another open of {key:?} won the race; discarding fresh item");
            self.source.dispose_item(key, &value);
            current.users += 1;
            current.attach(listener);
            return Ok(self.source.view(&current.value));
        }

        debug!("Opened cache element {key:?}");
        let view = self.source.view(&value);
        let mut element = Element {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            value: Arc::new(value),
            users: 1,
            listeners: Vec::new(),
        };
        element.attach(listener);
        elements.insert(key.clone(), element);
        Ok(view)
    }

    fn update_element(&self, key: &K, id: u64, old_value: Arc<S::Item>) -> Result<()> {
        let still_cached = self
            .lock_elements()
            .get(key)
            .is_some_and(|element| element.id == id && element.users > 0);
        if !still_cached {
            return Ok(());
        }

        let Some(new_value) = self.source.update_item(key, &old_value)? else {
            return Ok(());
        };

        let new_value = Arc::new(new_value);
        let listeners = {
            let mut elements = self.lock_elements();
            match elements.get_mut(key) {
                Some(element) if element.id == id && Arc::ptr_eq(&element.value, &old_value) => {
                    element.value = new_value.clone();
                    element.listeners.clone()
                }
                _ => {
                    debug!("Discarding stale update of {key:?}");
                    self.source.dispose_item(key, &new_value);
                    return Ok(());
                }
            }
        };

        if !listeners.is_empty() {
            let old_view = self.source.view(&old_value);
            let new_view = self.source.view(&new_value);
            for slot in listeners {
                slot.notify(key, &old_view, &new_view);
            }
        }

        self.source.dispose_item(key, &old_value);
        Ok(())
    }

    fn lock_elements(&self) -> MutexGuard<'_, ElementMap<K, S>> {
        self.elements.lock().expect(POISONED)
    }
}

impl<K, S> CacheUser<K, S::View> for DataCache<K, S>
where
    K: Eq + Hash + Clone + Debug,
    S: CacheSource<K>,
{
    fn open(&self, key: &K, listener: Option<SharedListener<K, S::View>>) -> Result<S::View> {
        DataCache::open(self, key, listener)
    }

    fn close(&self, key: &K, listener: Option<&SharedListener<K, S::View>>) -> Result<()> {
        DataCache::close(self, key, listener)
    }
}
