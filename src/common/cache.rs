/*
 * Copyright (c) 2024, the mail-audit contributors.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Instant;

use parking_lot::Mutex;

use crate::Txt;

/// TTL-aware LRU cache over resolved TXT answers, keyed by FQDN. Writes
/// are mutually exclusive; readers obtain cloned snapshots, never
/// references into the cache.
#[derive(Debug)]
pub(crate) struct TxtCache {
    inner: Mutex<lru_cache::LruCache<String, CachedTxt, ahash::RandomState>>,
}

#[derive(Debug)]
struct CachedTxt {
    value: Txt,
    valid_until: Instant,
}

impl TxtCache {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        TxtCache {
            inner: Mutex::new(lru_cache::LruCache::with_hasher(
                capacity,
                ahash::RandomState::new(),
            )),
        }
    }

    /// Returns the cached answer for `name`, evicting it instead when its
    /// TTL has passed.
    pub(crate) fn get(&self, name: &str) -> Option<Txt> {
        let mut cache = self.inner.lock();
        let entry = cache.get_mut(name)?;
        if entry.valid_until >= Instant::now() {
            Some(entry.value.clone())
        } else {
            cache.remove(name);
            None
        }
    }

    pub(crate) fn insert(&self, name: String, value: Txt, valid_until: Instant) -> Txt {
        self.inner.lock().insert(
            name,
            CachedTxt {
                value: value.clone(),
                valid_until,
            },
        );
        value
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crate::Txt;

    use super::TxtCache;

    fn txt(record: &str) -> Txt {
        Txt::from(record)
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache = TxtCache::with_capacity(4);
        cache.insert(
            "a.example.com.".to_string(),
            txt("v=spf1 -all"),
            Instant::now() + Duration::from_secs(60),
        );
        cache.insert(
            "b.example.com.".to_string(),
            txt("v=spf1 ~all"),
            Instant::now() - Duration::from_secs(1),
        );

        assert_eq!(cache.get("a.example.com."), Some(txt("v=spf1 -all")));
        assert_eq!(cache.get("b.example.com."), None);
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = TxtCache::with_capacity(2);
        let valid_until = Instant::now() + Duration::from_secs(60);
        cache.insert("a.".to_string(), txt("one"), valid_until);
        cache.insert("b.".to_string(), txt("two"), valid_until);
        cache.insert("c.".to_string(), txt("three"), valid_until);

        assert_eq!(cache.get("a."), None);
        assert_eq!(cache.get("b."), Some(txt("two")));
        assert_eq!(cache.get("c."), Some(txt("three")));
    }
}
