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

use paced::cache::{CacheListener, CacheSource, CacheUser, DataCache, DelayedClose, SharedListener};
use paced::{PacedError, RateLimitedMutex, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Usage-limit rules per child, as a parent device would push them.
#[derive(Default)]
struct RuleStore {
    limits: Mutex<HashMap<u32, u32>>,
    loads: AtomicUsize,
    updates: AtomicUsize,
    disposed: AtomicUsize,
}

impl RuleStore {
    fn set_limit(&self, child: u32, minutes: u32) {
        self.limits.lock().unwrap().insert(child, minutes);
    }

    fn limit(&self, child: u32) -> Result<u32> {
        self.limits
            .lock()
            .unwrap()
            .get(&child)
            .copied()
            .ok_or_else(|| PacedError::from_source(format!("no rules for child {child}")))
    }
}

impl CacheSource<u32> for RuleStore {
    type Item = u32;
    type View = u32;

    fn open_item(&self, key: &u32) -> Result<u32> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        self.limit(*key)
    }

    fn update_item(&self, key: &u32, item: &u32) -> Result<Option<u32>> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let current = self.limit(*key)?;
        Ok((current != *item).then_some(current))
    }

    fn dispose_item(&self, _key: &u32, _item: &u32) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }

    fn view(&self, item: &u32) -> u32 {
        *item
    }
}

#[derive(Default)]
struct LimitChanges(Mutex<Vec<(u32, u32, u32)>>);

impl CacheListener<u32, u32> for LimitChanges {
    fn on_element_updated(&self, key: &u32, old_value: &u32, new_value: &u32) {
        self.0.lock().unwrap().push((*key, *old_value, *new_value));
    }
}

fn unthrottled(store: RuleStore) -> DataCache<u32, RuleStore> {
    DataCache::with_throttle(store, RateLimitedMutex::with_cooldown(Duration::ZERO))
}

#[test]
fn concurrent_opens_load_each_key_once() {
    let store = RuleStore::default();
    store.set_limit(1, 90);
    let cache = unthrottled(store);
    let start = Barrier::new(8);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                start.wait();
                assert_eq!(cache.open(&1, None).unwrap(), 90);
            });
        }
    });

    assert_eq!(cache.source().loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.users(&1), 8);

    for _ in 0..8 {
        cache.close(&1, None).unwrap();
    }
    assert!(cache.is_empty());
    assert_eq!(cache.source().disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn refresh_pushes_rule_changes_to_listeners() {
    let store = RuleStore::default();
    store.set_limit(1, 90);
    store.set_limit(2, 30);
    let cache = unthrottled(store);

    let changes = Arc::new(LimitChanges::default());
    let listener: SharedListener<u32, u32> = changes.clone();
    cache.open(&1, Some(listener.clone())).unwrap();
    cache.open(&2, Some(listener.clone())).unwrap();

    cache.source().set_limit(2, 45);
    cache.refresh().unwrap();

    assert_eq!(*changes.0.lock().unwrap(), vec![(2, 30, 45)]);

    cache.close(&1, Some(&listener)).unwrap();
    cache.close(&2, Some(&listener)).unwrap();
    assert!(cache.is_empty());
}

#[test]
fn failed_load_leaves_no_element() {
    let cache = unthrottled(RuleStore::default());
    let err = cache.open(&5, None).unwrap_err();
    assert!(err.to_string().contains("no rules for child 5"));
    assert!(cache.is_empty());
}

#[test]
fn refreshes_are_spaced_by_the_throttle() {
    let store = RuleStore::default();
    store.set_limit(1, 60);
    let cache = DataCache::with_throttle(
        store,
        RateLimitedMutex::with_cooldown(Duration::from_millis(100)),
    );
    cache.open(&1, None).unwrap();

    let started = Instant::now();
    for _ in 0..3 {
        cache.refresh().unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(290));
    assert_eq!(cache.source().updates.load(Ordering::SeqCst), 3);
}

#[test]
fn delayed_close_keeps_rules_loaded_between_views() {
    let store = RuleStore::default();
    store.set_limit(3, 120);
    let delayed = DelayedClose::new(unthrottled(store), Duration::from_millis(150)).unwrap();

    assert_eq!(delayed.open(&3, None).unwrap(), 120);
    assert_eq!(delayed.inner().users(&3), 2);
    delayed.close(&3, None).unwrap();
    assert_eq!(delayed.inner().users(&3), 1);

    // A quick reopen reuses the loaded element.
    assert_eq!(delayed.open(&3, None).unwrap(), 120);
    assert_eq!(delayed.inner().source().loads.load(Ordering::SeqCst), 1);
    delayed.close(&3, None).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while delayed.inner().users(&3) > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(delayed.inner().users(&3), 0);
    assert_eq!(delayed.inner().source().disposed.load(Ordering::SeqCst), 1);
}
