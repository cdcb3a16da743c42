//! Strided partitioning of work into chunks.

/// Splits `items` into round-robin chunks.
///
/// Item `i` goes to chunk `i % n`, where `n` is clamped to
/// `max(1, min(chunks, items.len()))`. Chunk sizes differ by at most one and
/// each chunk keeps the relative input order of its items. An empty input
/// yields a single empty chunk.
///
/// # Examples
///
/// ```
/// use lexalign::partition::partition;
///
/// let chunks = partition((0..7).collect::<Vec<_>>(), 3);
/// assert_eq!(chunks, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
/// ```
#[must_use]
pub fn partition<T>(items: Vec<T>, chunks: usize) -> Vec<Vec<T>> {
    let n = chunks.min(items.len()).max(1);
    let per_chunk = items.len().div_ceil(n);

    let mut out: Vec<Vec<T>> = (0..n).map(|_| Vec::with_capacity(per_chunk)).collect();
    for (i, item) in items.into_iter().enumerate() {
        out[i % n].push(item);
    }
    out
}
