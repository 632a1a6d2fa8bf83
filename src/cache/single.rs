use crate::cache::{CacheSource, DataCache, SharedListener};
use crate::error::Result;
use crate::locking::RateLimitedMutex;

/// Backing store for a cache that holds exactly one item.
pub trait SingleItemSource: Send + Sync {
    type Item: Send + Sync;
    type View;

    fn open_item(&self) -> Result<Self::Item>;

    /// Returns `None` when `item` is still current.
    fn update_item(&self, item: &Self::Item) -> Result<Option<Self::Item>>;

    fn dispose_item(&self, item: &Self::Item);

    fn view(&self, item: &Self::Item) -> Self::View;

    fn wrap<R>(&self, operation: impl FnOnce() -> R) -> R {
        operation()
    }
}

struct Keyless<S>(S);

impl<S: SingleItemSource> CacheSource<()> for Keyless<S> {
    type Item = S::Item;
    type View = S::View;

    fn open_item(&self, _key: &()) -> Result<S::Item> {
        self.0.open_item()
    }

    fn update_item(&self, _key: &(), item: &S::Item) -> Result<Option<S::Item>> {
        self.0.update_item(item)
    }

    fn dispose_item(&self, _key: &(), item: &S::Item) {
        self.0.dispose_item(item)
    }

    fn view(&self, item: &S::Item) -> S::View {
        self.0.view(item)
    }

    fn wrap<R>(&self, operation: impl FnOnce() -> R) -> R {
        self.0.wrap(operation)
    }
}

/// Reference-counted cache of a single item; see [`DataCache`].
pub struct SingleItemCache<S: SingleItemSource> {
    inner: DataCache<(), Keyless<S>>,
}

impl<S: SingleItemSource> SingleItemCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_throttle(source, RateLimitedMutex::new())
    }

    pub fn with_throttle(source: S, throttle: RateLimitedMutex) -> Self {
        Self {
            inner: DataCache::with_throttle(Keyless(source), throttle),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source().0
    }

    pub fn users(&self) -> usize {
        self.inner.users(&())
    }

    pub fn open(&self, listener: Option<SharedListener<(), S::View>>) -> Result<S::View> {
        self.inner.open(&(), listener)
    }

    pub fn close(&self, listener: Option<&SharedListener<(), S::View>>) -> Result<()> {
        self.inner.close(&(), listener)
    }

    pub fn refresh(&self) -> Result<()> {
        self.inner.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheListener;
    use crate::error::PacedError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Counter {
        value: AtomicU32,
        disposed: Mutex<Vec<u32>>,
    }

    impl SingleItemSource for Counter {
        type Item = u32;
        type View = u32;

        fn open_item(&self) -> Result<u32> {
            Ok(self.value.load(Ordering::SeqCst))
        }

        fn update_item(&self, item: &u32) -> Result<Option<u32>> {
            let current = self.value.load(Ordering::SeqCst);
            Ok((current != *item).then_some(current))
        }

        fn dispose_item(&self, item: &u32) {
            self.disposed.lock().unwrap().push(*item);
        }

        fn view(&self, item: &u32) -> u32 {
            *item
        }
    }

    #[derive(Default)]
    struct Changes(Mutex<Vec<(u32, u32)>>);

    impl CacheListener<(), u32> for Changes {
        fn on_element_updated(&self, _key: &(), old_value: &u32, new_value: &u32) {
            self.0.lock().unwrap().push((*old_value, *new_value));
        }
    }

    fn cache() -> SingleItemCache<Counter> {
        SingleItemCache::with_throttle(
            Counter::default(),
            RateLimitedMutex::with_cooldown(Duration::ZERO),
        )
    }

    #[test]
    fn refresh_delivers_changes_to_listener() {
        let cache = cache();
        let changes = Arc::new(Changes::default());
        let listener: SharedListener<(), u32> = changes.clone();

        assert_eq!(cache.open(Some(listener.clone())).unwrap(), 0);
        cache.source().value.store(4, Ordering::SeqCst);
        cache.refresh().unwrap();

        assert_eq!(*changes.0.lock().unwrap(), vec![(0, 4)]);
        cache.close(Some(&listener)).unwrap();
        assert_eq!(cache.users(), 0);
        assert_eq!(*cache.source().disposed.lock().unwrap(), vec![0, 4]);
    }

    #[test]
    fn close_when_not_open_fails() {
        let cache = cache();
        assert!(matches!(
            cache.close(None).unwrap_err(),
            PacedError::CacheNotOpen(_)
        ));
    }
}
