//! Property-based tests for normalization and ranking.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Word and language normalization are idempotent
//! - Merging keeps the first occurrence of every idiom, once
//! - Ranked lists are sorted and bounded
//! - Storage keys decode back to the same key

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use idiomstore::accessor::ranking::{merge_dedup, sort_by_order, top_n};
use idiomstore::models::{normalize_language, normalize_word};
use idiomstore::{Idiom, IdiomField, IdiomId, IdiomOrder, StorageKey};
use proptest::prelude::*;
use std::collections::HashSet;

fn idiom_strategy() -> impl Strategy<Value = Idiom> {
    (1i64..50, -20i64..20, 0usize..6).prop_map(|(id, rating, impl_count)| {
        let mut idiom = Idiom::new(IdiomId::new(id), format!("idiom {id}"));
        idiom.rating = rating;
        idiom.impl_count = impl_count;
        idiom
    })
}

fn order_strategy() -> impl Strategy<Value = IdiomOrder> {
    (
        prop::sample::select(vec![IdiomField::Id, IdiomField::Rating, IdiomField::ImplCount]),
        any::<bool>(),
    )
        .prop_map(|(field, descending)| IdiomOrder { field, descending })
}

fn field_value(idiom: &Idiom, field: IdiomField) -> i64 {
    match field {
        IdiomField::Rating => idiom.rating,
        IdiomField::ImplCount => i64::try_from(idiom.impl_count).unwrap(),
        _ => idiom.id.get(),
    }
}

proptest! {
    /// Property: normalizing a word twice changes nothing.
    #[test]
    fn prop_normalize_word_idempotent(word in "\\PC{0,30}") {
        let once = normalize_word(&word);
        prop_assert_eq!(normalize_word(&once), once.clone());
        prop_assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    /// Property: normalized language names are single lowercase tokens.
    #[test]
    fn prop_normalize_language_idempotent(language in "[A-Za-z+#. -]{0,12}") {
        let once = normalize_language(&language);
        prop_assert_eq!(normalize_language(&once), once.clone());
        prop_assert!(!once.contains(' '));
        prop_assert_eq!(normalize_language(&language.to_uppercase()), once);
    }

    /// Property: merging yields each id once, at its first position.
    #[test]
    fn prop_merge_keeps_first_occurrence(
        lists in prop::collection::vec(prop::collection::vec(idiom_strategy(), 0..10), 0..4)
    ) {
        let flat: Vec<Idiom> = lists.iter().flatten().cloned().collect();
        let merged = merge_dedup(lists);

        let mut seen = HashSet::new();
        let expected: Vec<Idiom> = flat.into_iter().filter(|i| seen.insert(i.id)).collect();
        prop_assert_eq!(merged, expected);
    }

    /// Property: `top_n` returns at most `n` idioms, sorted on the order.
    #[test]
    fn prop_top_n_sorted_and_bounded(
        idioms in prop::collection::vec(idiom_strategy(), 0..30),
        order in order_strategy(),
        n in 0usize..40,
    ) {
        let total = idioms.len();
        let ranked = top_n(idioms, order, n);

        prop_assert_eq!(ranked.len(), total.min(n));
        for pair in ranked.windows(2) {
            let (a, b) = (field_value(&pair[0], order.field), field_value(&pair[1], order.field));
            if order.descending {
                prop_assert!(a >= b);
            } else {
                prop_assert!(a <= b);
            }
        }
    }

    /// Property: sorting twice is the same as sorting once.
    #[test]
    fn prop_sort_is_stable_under_repeat(
        mut idioms in prop::collection::vec(idiom_strategy(), 0..30),
        order in order_strategy(),
    ) {
        sort_by_order(&mut idioms, order);
        let once = idioms.clone();
        sort_by_order(&mut idioms, order);
        prop_assert_eq!(idioms, once);
    }

    /// Property: storage keys of positive ids survive encoding.
    #[test]
    fn prop_storage_key_decodes(id in 1i64..i64::MAX) {
        let key = StorageKey::for_idiom(IdiomId::new(id));
        prop_assert_eq!(StorageKey::decode(&key.encode()).unwrap(), key);
    }

    /// Property: non-positive ids never decode.
    #[test]
    fn prop_storage_key_rejects_non_positive(id in i64::MIN..=0) {
        let encoded = format!("Idiom:{}", id);
        prop_assert!(StorageKey::decode(&encoded).is_err());
    }
}
