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

//! Reference-counted data caches whose loads and refreshes are throttled.
//!
//! A cache keeps one element per key for as long as at least one user has it
//! open. Opening an already-cached key refreshes it first, and the owner may
//! refresh every cached element at once. Loads and refreshes all go through
//! one [`RateLimitedMutex`](crate::locking::RateLimitedMutex) per cache, so a
//! burst of opens or refresh requests reaches the backing source at most once
//! per cooldown.

pub mod close_delay;
pub mod keyed;
pub mod single;

pub use close_delay::DelayedClose;
pub use keyed::DataCache;
pub use single::{SingleItemCache, SingleItemSource};

use crate::error::Result;
use std::sync::Arc;

/// Backing store that produces and maintains cached items.
pub trait CacheSource<K>: Send + Sync {
    /// Internal representation kept in the cache.
    type Item: Send + Sync;
    /// Representation handed to users and listeners.
    type View;

    fn open_item(&self, key: &K) -> Result<Self::Item>;

    /// Returns `None` when `item` is still current.
    fn update_item(&self, key: &K, item: &Self::Item) -> Result<Option<Self::Item>>;

    /// Frees resources held by an item that left the cache. Must not block.
    fn dispose_item(&self, key: &K, item: &Self::Item);

    fn view(&self, item: &Self::Item) -> Self::View;

    /// Scope wrapped around every open and refresh, e.g. a read transaction.
    fn wrap<R>(&self, operation: impl FnOnce() -> R) -> R {
        operation()
    }
}

/// Receives the new value whenever a cached element changes.
///
/// Callbacks run on the refreshing thread and must not call back into the
/// cache that notifies them.
pub trait CacheListener<K, V>: Send + Sync {
    fn on_element_updated(&self, key: &K, old_value: &V, new_value: &V);
}

pub type SharedListener<K, V> = Arc<dyn CacheListener<K, V>>;

/// The user-facing half of a cache: open a key, later close it again.
pub trait CacheUser<K, V> {
    fn open(&self, key: &K, listener: Option<SharedListener<K, V>>) -> Result<V>;

    fn close(&self, key: &K, listener: Option<&SharedListener<K, V>>) -> Result<()>;
}

pub(crate) fn same_listener<K, V>(a: &SharedListener<K, V>, b: &SharedListener<K, V>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
