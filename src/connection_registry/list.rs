//! Pagination helper for [`super::ConnectionRegistry::list`]
//! (`# 4.3 Concurrency`): a consistent snapshot of keys, sorted
//! lexicographically, with the cursor resolved by binary search and the
//! tail sentinel `"\xff"` marking "no more items".

use crate::domain::common::{ListOptions, Page};

pub const TAIL_SENTINEL: &str = "\u{ff}";

pub fn paginate_keys<T>(
    mut keys: Vec<String>,
    options: ListOptions,
    fetch: impl Fn(&str) -> Option<T>,
) -> Page<T> {
    keys.sort();

    let start_index = match &options.continue_token {
        Some(token) if token == TAIL_SENTINEL => keys.len(),
        Some(token) => keys.partition_point(|k| k.as_str() < token.as_str()),
        None => 0,
    };

    let limit = options.limit.unwrap_or(i64::MAX).max(0) as usize;
    let end_index = (start_index + limit).min(keys.len());

    let items = keys[start_index..end_index]
        .iter()
        .filter_map(|k| fetch(k))
        .collect();

    let continue_token = if end_index < keys.len() {
        Some(keys[end_index].clone())
    } else if start_index < keys.len() {
        // Reached the end of a non-empty snapshot: advertise the sentinel
        // so a caller with an empty-string cursor can tell "no more items"
        // apart from "continue from the start".
        Some(TAIL_SENTINEL.to_string())
    } else {
        None
    };

    Page {
        remaining_item_count: Some((keys.len() - end_index) as i64),
        items,
        continue_token,
    }
}
