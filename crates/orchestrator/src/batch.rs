/// Number of orders outstanding at once for a list of `total` orders.
///
/// `None` means everything in one batch; the result is always within
/// `1..=total` (and 1 for an empty list).
pub fn batch_size(total: usize, max_concurrent: Option<usize>) -> usize {
    let total = total.max(1);
    max_concurrent.unwrap_or(total).clamp(1, total)
}

/// Split `items` into consecutive batches of `size`. The last batch holds the
/// remainder and may be smaller.
pub fn into_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter();

    loop {
        let batch: Vec<T> = items.by_ref().take(size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }

    batches
}
