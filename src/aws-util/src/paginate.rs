//! A small helper for transparently consuming a token-paginated AWS SDK
//! call until it is exhausted, used by every facade operation that lists
//! more than a handful of resources (spec.md §4.3 "Pagination").

use futures::stream::{Stream, StreamExt};

/// Drains a paginator-backed stream of `Result<T, E>` into a single flat
/// `Vec<T>`, stopping at the first error.
pub async fn collect_paginated<T, E>(
    mut stream: impl Stream<Item = Result<T, E>> + Unpin,
) -> Result<Vec<T>, E> {
    let mut items = Vec::new();
    while let Some(page) = stream.next().await {
        items.push(page?);
    }
    Ok(items)
}
