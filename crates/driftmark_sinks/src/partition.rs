//! Chunk partitioning for the bulk-streaming strategy.

/// How index ranges are derived from a batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionMode {
    /// Cover every row exactly once. Chunk sizes never exceed
    /// `chunk_size` and differ by at most one.
    #[default]
    Exact,
    /// Historical scheme: `floor(total/chunk)` chunks, the first
    /// `remainder` of them one row larger. Leaves the trailing partial
    /// chunk unwritten when `total` is not a multiple of `chunk_size`,
    /// and yields no chunks at all when `total < chunk_size`. Kept only
    /// for byte-compatible replays of old ingest runs.
    Legacy,
}

/// Split `[0, total_size)` into contiguous, non-overlapping,
/// inclusive-inclusive index ranges in ascending order.
///
/// Panics if `chunk_size` is zero.
pub fn partition_indexes(
    total_size: usize,
    chunk_size: usize,
    mode: PartitionMode,
) -> Vec<(usize, usize)> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    match mode {
        PartitionMode::Exact => partition_exact(total_size, chunk_size),
        PartitionMode::Legacy => partition_legacy(total_size, chunk_size),
    }
}

fn partition_exact(total_size: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    if total_size == 0 {
        return Vec::new();
    }
    let num_chunks = total_size.div_ceil(chunk_size);
    let base = total_size / num_chunks;
    let extra = total_size % num_chunks;

    let mut indexes = Vec::with_capacity(num_chunks);
    let mut start = 0;
    for i in 0..num_chunks {
        let size = base + usize::from(i < extra);
        indexes.push((start, start + size - 1));
        start += size;
    }
    indexes
}

fn partition_legacy(total_size: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let num_partitions = total_size / chunk_size;
    let remainder = total_size - chunk_size * num_partitions;

    let mut indexes = Vec::with_capacity(num_partitions);
    let mut start = 0;
    for i in 0..num_partitions {
        let end = start + chunk_size + usize::from(i < remainder);
        indexes.push((start, end - 1));
        start = end;
    }
    indexes
}
