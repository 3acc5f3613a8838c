//! Pure ordering over resolved attribute values.
//!
//! Absent values always trail the present group, in both sort directions.
//! That is a placement rule, not an infinity sentinel: a sentinel would
//! invert under descending order. The present group compares by the
//! attribute's declared kind and the sort is stable, so equal values keep
//! their playlist order.

use std::cmp::Ordering;

use crate::resolve::Resolved;

/// Textual fallback form used when runtime types are mixed.
fn textual(value: &Resolved) -> String {
    match value {
        Resolved::Number(n) => format!("{n}"),
        Resolved::Date(d) => format!("{:04}-{:02}-{:02}", d.year, d.month, d.day),
        Resolved::Text(s) => s.to_lowercase(),
        Resolved::Absent => String::new(),
    }
}

fn compare(a: &Resolved, b: &Resolved) -> Ordering {
    match (a, b) {
        (Resolved::Number(x), Resolved::Number(y)) => x.total_cmp(y),
        (Resolved::Date(x), Resolved::Date(y)) => x.cmp(y),
        (Resolved::Text(x), Resolved::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        // Mixed types are unexpected; numbers come first, the rest falls
        // back to textual comparison.
        (Resolved::Number(_), _) => Ordering::Less,
        (_, Resolved::Number(_)) => Ordering::Greater,
        _ => textual(a).cmp(&textual(b)),
    }
}

/// Order track ids by their resolved values. Output is a permutation of the
/// input ids; `descending` reverses the present group only.
pub fn rank(items: &[(String, Resolved)], descending: bool) -> Vec<String> {
    let mut present: Vec<&(String, Resolved)> = Vec::with_capacity(items.len());
    let mut absent: Vec<&String> = Vec::new();
    for item in items {
        match item.1 {
            Resolved::Absent => absent.push(&item.0),
            _ => present.push(item),
        }
    }

    // Vec::sort_by is stable; reversing Equal keeps it Equal, so equal
    // values retain input order under both directions.
    present.sort_by(|a, b| {
        let ord = compare(&a.1, &b.1);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });

    present
        .into_iter()
        .map(|(id, _)| id.clone())
        .chain(absent.into_iter().cloned())
        .collect()
}
