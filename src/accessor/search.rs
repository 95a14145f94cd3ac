//! Language-aware full-text search.

use crate::models::{Idiom, TextQuery};
use crate::{Error, Result};

/// Two-phase search: favorite languages first, then the others.
///
/// `run` executes one full-text query with a result cap and resolves the hits
/// to idioms. Phase 1 is `base AND langs`. Phase 2, `base AND NOT langs`,
/// only runs when phase 1 succeeded, did not fill `limit` and the caller
/// wants non-favorite results. A phase 2 failure yields
/// [`Error::PartialResults`] carrying the phase 1 idioms.
///
/// # Errors
///
/// Returns the phase 1 error as is, or `PartialResults` when phase 2 fails.
pub fn two_phase<F>(
    base: &TextQuery,
    favorites: &[String],
    see_non_favorite: bool,
    limit: usize,
    mut run: F,
) -> Result<Vec<Idiom>>
where
    F: FnMut(&TextQuery, usize) -> Result<Vec<Idiom>>,
{
    if limit == 0 || base.is_empty() {
        return Ok(Vec::new());
    }

    let langs = TextQuery::languages(favorites);
    if langs.is_empty() {
        return run(base, limit);
    }

    let mut favorite_hits = run(&base.clone().and(langs.clone()), limit)?;
    if favorite_hits.len() >= limit || !see_non_favorite {
        return Ok(favorite_hits);
    }

    let remaining = limit - favorite_hits.len();
    match run(&base.clone().and_not(langs), remaining) {
        Ok(others) => {
            favorite_hits.extend(others);
            Ok(favorite_hits)
        },
        Err(cause) => {
            tracing::warn!(error = %cause, "Non-favorite search phase failed");
            Err(Error::PartialResults {
                idioms: favorite_hits,
                cause: Box::new(cause),
            })
        },
    }
}
