//! Ranked list building: per-language queries, merge and re-sort.

use crate::models::{Idiom, IdiomField, IdiomOrder, IdiomQuery};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Queries answering a favorites-aware ordered list.
///
/// One query per favorite language, then one unfiltered query when
/// `show_other` is set. Each is sorted on `order` then by id descending and
/// capped at `limit_each_lang`.
#[must_use]
pub fn filter_order_queries(
    favorites: &[String],
    limit_each_lang: usize,
    show_other: bool,
    order: IdiomOrder,
) -> Vec<IdiomQuery> {
    let base = IdiomQuery::new()
        .order_by(order)
        .order_by(IdiomOrder::desc(IdiomField::Id))
        .with_limit(limit_each_lang);

    let mut queries: Vec<IdiomQuery> = favorites
        .iter()
        .map(|language| base.clone().with_language(language.clone()))
        .collect();
    if show_other {
        queries.push(base);
    }
    queries
}

/// Concatenates lists, keeping the first occurrence of each idiom id.
pub fn merge_dedup<I>(lists: I) -> Vec<Idiom>
where
    I: IntoIterator<Item = Vec<Idiom>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for idiom in list {
            if seen.insert(idiom.id) {
                merged.push(idiom);
            }
        }
    }
    merged
}

/// Compares two idioms on one field, ascending.
fn compare_field(a: &Idiom, b: &Idiom, field: IdiomField) -> Ordering {
    match field {
        IdiomField::Id => a.id.cmp(&b.id),
        IdiomField::Rating => a.rating.cmp(&b.rating),
        IdiomField::VersionDate => a.version_date.cmp(&b.version_date),
        IdiomField::CreationDate => a.creation_date.cmp(&b.creation_date),
        IdiomField::Title => a.title.cmp(&b.title),
        IdiomField::ImplCount => a.impl_count.cmp(&b.impl_count),
    }
}

/// Stable sort on `order`, ties broken by id descending.
pub fn sort_by_order(idioms: &mut [Idiom], order: IdiomOrder) {
    idioms.sort_by(|a, b| {
        let primary = compare_field(a, b, order.field);
        let primary = if order.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| b.id.cmp(&a.id))
    });
}

/// Reorders the implementations of every idiom, favorite languages first.
pub fn favorites_first(idioms: &mut [Idiom], favorites: &[String], see_non_favorite: bool) {
    for idiom in idioms {
        idiom.favorite_languages_first(favorites, see_non_favorite);
    }
}

/// Re-sorts a merged list and keeps the first `n`.
#[must_use]
pub fn top_n(mut idioms: Vec<Idiom>, order: IdiomOrder, n: usize) -> Vec<Idiom> {
    sort_by_order(&mut idioms, order);
    idioms.truncate(n);
    idioms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdiomId, ImplId, Implementation};

    fn idiom(id: i64, rating: i64) -> Idiom {
        let mut idiom = Idiom::new(IdiomId::new(id), format!("idiom {id}"));
        idiom.rating = rating;
        idiom
    }

    fn ids(idioms: &[Idiom]) -> Vec<i64> {
        idioms.iter().map(|i| i.id.get()).collect()
    }

    #[test]
    fn test_merge_dedup_first_wins() {
        let mut first_copy = idiom(2, 10);
        first_copy.title = "first".to_string();
        let merged = merge_dedup(vec![
            vec![idiom(1, 0), first_copy],
            vec![idiom(2, 10), idiom(3, 0)],
            vec![idiom(1, 0)],
        ]);
        assert_eq!(ids(&merged), vec![1, 2, 3]);
        assert_eq!(merged[1].title, "first");
    }

    #[test]
    fn test_sort_descending_with_id_tie_break() {
        let mut idioms = vec![idiom(1, 5), idiom(2, 9), idiom(3, 5), idiom(4, 1)];
        sort_by_order(&mut idioms, IdiomOrder::desc(IdiomField::Rating));
        assert_eq!(ids(&idioms), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_sort_ascending() {
        let mut idioms = vec![idiom(1, 5), idiom(2, 9), idiom(3, 5)];
        sort_by_order(&mut idioms, IdiomOrder::asc(IdiomField::Rating));
        assert_eq!(ids(&idioms), vec![3, 1, 2]);
    }

    #[test]
    fn test_top_n_truncates() {
        let top = top_n(
            vec![idiom(1, 1), idiom(2, 2), idiom(3, 3)],
            IdiomOrder::desc(IdiomField::Rating),
            2,
        );
        assert_eq!(ids(&top), vec![3, 2]);
    }

    #[test]
    fn test_filter_order_queries() {
        let favorites = vec!["Go".to_string(), "Rust".to_string()];
        let order = IdiomOrder::desc(IdiomField::VersionDate);

        let queries = filter_order_queries(&favorites, 7, true, order);
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].language.as_deref(), Some("Go"));
        assert_eq!(queries[1].language.as_deref(), Some("Rust"));
        assert_eq!(queries[2].language, None);
        for query in &queries {
            assert_eq!(query.limit, 7);
            assert_eq!(
                query.order,
                vec![order, IdiomOrder::desc(IdiomField::Id)]
            );
        }

        assert_eq!(filter_order_queries(&favorites, 7, false, order).len(), 2);
        assert!(filter_order_queries(&[], 7, false, order).is_empty());
    }

    #[test]
    fn test_favorites_first_reorders_every_idiom() {
        let mut idioms = vec![
            Idiom::new(IdiomId::new(1), "a")
                .with_implementation(Implementation::new(ImplId::new(1), "Java", ""))
                .with_implementation(Implementation::new(ImplId::new(2), "Go", "")),
        ];
        favorites_first(&mut idioms, &["go".to_string()], true);
        let languages: Vec<&str> = idioms[0].implemented_languages();
        assert_eq!(languages, vec!["Go", "Java"]);
    }
}
