//! Rendering of [`TextQuery`] into FTS5 `MATCH` expressions.
//!
//! Word terms become prefix phrases over `bulk`, language terms exact
//! phrases over `langs`:
//!
//! ```text
//! bulk : ("sort"* AND "map"*) AND langs : ("go" OR "rust")
//! ```
//!
//! FTS5 `NOT` is binary, so `AndNot(a, b)` renders as `(a) NOT (b)`.

use crate::models::TextQuery;

/// Renders `query`, or returns `None` if it can match nothing.
#[must_use]
pub fn render_fts5(query: &TextQuery) -> Option<String> {
    if query.is_empty() {
        return None;
    }
    Some(render(query))
}

fn render(query: &TextQuery) -> String {
    match query {
        TextQuery::Words(words) => column_filter("bulk", words, " AND ", true),
        TextQuery::Languages(languages) => column_filter("langs", languages, " OR ", false),
        TextQuery::And(left, right) => format!("({}) AND ({})", render(left), render(right)),
        TextQuery::AndNot(left, right) => {
            if right.is_empty() {
                render(left)
            } else {
                format!("({}) NOT ({})", render(left), render(right))
            }
        },
    }
}

fn column_filter(column: &str, terms: &[String], operator: &str, prefix: bool) -> String {
    let phrases: Vec<String> = terms.iter().map(|t| phrase(t, prefix)).collect();
    format!("{column} : ({})", phrases.join(operator))
}

fn phrase(term: &str, prefix: bool) -> String {
    let escaped = term.replace('"', "\"\"");
    if prefix {
        format!("\"{escaped}\"*")
    } else {
        format!("\"{escaped}\"")
    }
}
