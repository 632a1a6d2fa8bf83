use criterion::{Criterion, black_box};
use paced::cache::{CacheSource, DataCache};
use paced::{RateLimitedMutex, Result};
use std::time::Duration;

struct Squares;

impl CacheSource<u64> for Squares {
    type Item = u64;
    type View = u64;

    fn open_item(&self, key: &u64) -> Result<u64> {
        Ok(key * key)
    }

    fn update_item(&self, _key: &u64, _item: &u64) -> Result<Option<u64>> {
        Ok(None)
    }

    fn dispose_item(&self, _key: &u64, _item: &u64) {}

    fn view(&self, item: &u64) -> u64 {
        *item
    }
}

pub fn bench_cache_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_operations");

    let cache = DataCache::with_throttle(Squares, RateLimitedMutex::with_cooldown(Duration::ZERO));
    // Keep one user so the element stays resident between iterations.
    let _ = cache.open(&12, None);

    group.bench_function("open_close_resident", |b| {
        b.iter(|| {
            let value = cache.open(black_box(&12), None);
            let _ = cache.close(&12, None);
            black_box(value)
        })
    });

    group.bench_function("refresh_unchanged", |b| b.iter(|| black_box(cache.refresh())));

    group.finish();
}
