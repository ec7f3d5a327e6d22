/// Worker count used when nothing else is configured.
pub const DEFAULT_MAX_CHUNKS: usize = 5;

/// Splits `items` into `min(len, max_chunks)` contiguous, non-empty chunks.
///
/// Sizes differ by at most one and the larger chunks come first, so no chunk holds
/// more than `ceil(len / max_chunks)` items. A `max_chunks` of zero is treated as one.
pub fn partition<T>(items: &[T], max_chunks: usize) -> Vec<&[T]> {
    let len = items.len();
    let count = max_chunks.max(1).min(len);
    if count == 0 {
        return Vec::new();
    }

    let base = len / count;
    let extra = len % count;
    let mut chunks = Vec::with_capacity(count);
    let mut rest = items;
    for index in 0..count {
        let size = base + usize::from(index < extra);
        let (head, tail) = rest.split_at(size);
        chunks.push(head);
        rest = tail;
    }
    chunks
}
