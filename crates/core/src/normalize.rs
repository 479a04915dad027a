//! Sheet row cleanup.

use std::collections::HashSet;

use tracing::debug;

use crate::models::{BanSet, Identity, Row};

/// Drop rows whose identity key repeats an earlier row's key.
///
/// Keys are compared after trim + lowercase. The first occurrence wins and
/// relative order is preserved.
pub fn normalize_rows(rows: Vec<Row>) -> Vec<Row> {
    let total = rows.len();
    let mut seen = HashSet::new();
    let unique: Vec<Row> = rows
        .into_iter()
        .filter(|row| seen.insert(row.key().trim().to_lowercase()))
        .collect();

    if unique.len() != total {
        debug!(total, kept = unique.len(), "dropped duplicate rows");
    }
    unique
}

/// First-column identities of a row list, blanks skipped.
pub fn identities(rows: &[Row]) -> Vec<Identity> {
    rows.iter().filter_map(Row::identity).collect()
}

/// Build the ban set from the banned rows.
pub fn ban_set(rows: &[Row]) -> BanSet {
    rows.iter().filter_map(Row::identity).collect()
}
