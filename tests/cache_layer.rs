//! Cache behavior of the accessor stack.
//!
//! Primary store reads are counted to tell cache hits from misses.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{Harness, idiom, titles, words};
use idiomstore::{
    ApplicationConfig, CacheBackend, CacheTtls, DataAccessor, Error, IdiomId, ImplId,
    RequestContext,
};
use std::thread;
use std::time::Duration;

fn harness_with_two_idioms() -> Harness {
    let h = Harness::new();
    let ctx = RequestContext::new();
    h.stack
        .accessor
        .save_new_idiom(&ctx, &mut idiom(1, "Sort a list", &[(1, "Go"), (2, "Rust")]))
        .unwrap();
    h.stack
        .accessor
        .save_new_idiom(&ctx, &mut idiom(2, "Sort a map", &[(3, "Go")]))
        .unwrap();
    h.drain();
    h
}

#[test]
fn test_saved_idiom_served_from_cache() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let before = h.persistence.reads();

    let (key, by_id) = h.stack.accessor.get_idiom(&ctx, IdiomId::new(1)).unwrap();
    let (key_by_impl, by_impl) = h
        .stack
        .accessor
        .get_idiom_by_impl_id(&ctx, ImplId::new(2))
        .unwrap();

    assert_eq!(key, key_by_impl);
    assert_eq!(by_id, by_impl);
    assert_eq!(h.persistence.reads(), before);
}

#[test]
fn test_update_recaches_new_version() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;

    let (key, mut stored) = accessor.get_idiom(&ctx, IdiomId::new(1)).unwrap();
    stored.title = "Sort a vector".to_string();
    accessor.save_existing_idiom(&ctx, &key, &mut stored).unwrap();
    h.drain();

    let before = h.persistence.reads();
    let (_, cached) = accessor.get_idiom(&ctx, IdiomId::new(1)).unwrap();
    assert_eq!(cached.title, "Sort a vector");
    assert_eq!(cached.version, 2);
    assert_eq!(h.persistence.reads(), before);
}

#[test]
fn test_listing_cached_until_delete() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;
    let query = words(&["sort"]);

    assert_eq!(
        accessor
            .search_idioms_by_words(&ctx, &query, None, 10)
            .unwrap()
            .len(),
        2
    );
    let after_first = h.persistence.reads();
    // Word order and case do not change the cache key
    accessor
        .search_idioms_by_words(&ctx, &words(&["SORT"]), None, 10)
        .unwrap();
    assert_eq!(h.persistence.reads(), after_first);

    accessor.delete_idiom(&ctx, IdiomId::new(2)).unwrap();
    let after_delete = h.persistence.reads();
    let found = accessor
        .search_idioms_by_words(&ctx, &query, None, 10)
        .unwrap();
    assert_eq!(titles(&found), vec!["Sort a list"]);
    assert!(h.persistence.reads() > after_delete);
    assert!(
        accessor
            .get_idiom(&ctx, IdiomId::new(2))
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn test_listing_stale_after_save_until_expiry() {
    let h = Harness::with_ttls(CacheTtls {
        lists: Duration::from_millis(300),
        ..CacheTtls::default()
    });
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;

    accessor
        .save_new_idiom(&ctx, &mut idiom(1, "Sort a list", &[(1, "Go")]))
        .unwrap();
    let first = accessor
        .search_idioms_by_langs(&ctx, &words(&["Go"]), 10)
        .unwrap();
    assert_eq!(first.len(), 1);

    accessor
        .save_new_idiom(&ctx, &mut idiom(2, "Sort a map", &[(2, "Go")]))
        .unwrap();
    let stale = accessor
        .search_idioms_by_langs(&ctx, &words(&["go"]), 10)
        .unwrap();
    assert_eq!(stale.len(), 1);

    thread::sleep(Duration::from_millis(600));
    let fresh = accessor
        .search_idioms_by_langs(&ctx, &words(&["Go"]), 10)
        .unwrap();
    assert_eq!(fresh.len(), 2);
}

#[test]
fn test_favorite_searches_bypass_cache() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let query = words(&["sort"]);
    let favorites = words(&["Rust"]);

    h.stack
        .accessor
        .search_idioms_by_words_with_favorites(&ctx, &query, &favorites, true, 10)
        .unwrap();
    let before = h.persistence.reads();
    let found = h
        .stack
        .accessor
        .search_idioms_by_words_with_favorites(&ctx, &query, &favorites, true, 10)
        .unwrap();

    assert_eq!(found[0].title, "Sort a list");
    assert!(h.persistence.reads() > before);
}

#[test]
fn test_broken_cache_degrades_to_store() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;
    h.cache.set_broken(true);

    let before = h.persistence.reads();
    let (_, found) = accessor.get_idiom(&ctx, IdiomId::new(1)).unwrap();
    assert_eq!(found.title, "Sort a list");
    assert!(h.persistence.reads() > before);

    accessor
        .save_new_idiom(&ctx, &mut idiom(3, "Sort a set", &[(4, "Go")]))
        .unwrap();
    accessor.delete_idiom(&ctx, IdiomId::new(2)).unwrap();
    assert_eq!(
        accessor
            .search_idioms_by_langs(&ctx, &words(&["Go"]), 10)
            .unwrap()
            .len(),
        2
    );
    assert_eq!(accessor.languages_having_impl(&ctx).unwrap().len(), 2);

    assert!(matches!(
        accessor.delete_cache(&ctx),
        Err(Error::Upstream { .. })
    ));
}

#[test]
fn test_corrupt_entry_is_bypassed() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();

    h.cache
        .set("getIdiom(1)", b"\x07not an entry", Duration::from_secs(60))
        .unwrap();
    let before = h.persistence.reads();
    let (_, found) = h.stack.accessor.get_idiom(&ctx, IdiomId::new(1)).unwrap();

    assert_eq!(found.id, IdiomId::new(1));
    assert!(h.persistence.reads() > before);
}

#[test]
fn test_app_config_cached_and_flushed_on_save() {
    let h = Harness::new();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;

    assert!(accessor.get_app_config(&ctx).unwrap_err().is_not_found());

    let mut config = ApplicationConfig {
        id: 1,
        ..ApplicationConfig::default()
    };
    config.toggles.insert("writable".to_string(), true);
    accessor.save_app_config(&ctx, &config).unwrap();
    assert_eq!(accessor.get_app_config(&ctx).unwrap(), config);

    let before = h.persistence.reads();
    assert_eq!(accessor.get_app_config(&ctx).unwrap(), config);
    assert_eq!(h.persistence.reads(), before);

    config.toggles.insert("writable".to_string(), false);
    accessor.save_app_config(&ctx, &config).unwrap();
    assert!(!accessor.get_app_config(&ctx).unwrap().is_enabled("writable"));
}

#[test]
fn test_delete_all_flushes_listings() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;

    let (keys, _) = accessor.get_all_idioms(&ctx, 0, None).unwrap();
    assert_eq!(keys.len(), 2);

    accessor.delete_all_idioms(&ctx).unwrap();
    let (keys, idioms) = accessor.get_all_idioms(&ctx, 0, None).unwrap();
    assert!(keys.is_empty());
    assert!(idioms.is_empty());
    assert!(
        accessor
            .get_idiom(&ctx, IdiomId::new(1))
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn test_delete_cache_forces_reload() {
    let h = harness_with_two_idioms();
    let ctx = RequestContext::new();
    let accessor = &h.stack.accessor;

    accessor.languages_having_impl(&ctx).unwrap();
    let before = h.persistence.reads();
    accessor.languages_having_impl(&ctx).unwrap();
    assert_eq!(h.persistence.reads(), before);

    accessor.delete_cache(&ctx).unwrap();
    accessor.languages_having_impl(&ctx).unwrap();
    assert!(h.persistence.reads() > before);
}
