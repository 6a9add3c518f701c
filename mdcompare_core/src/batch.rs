use std::num::NonZeroUsize;

/// Split `items` into consecutive chunks of at most `size` elements.
///
/// Order is preserved and only the final chunk may be shorter. An empty
/// input produces no chunks at all.
pub fn split_in_batches<T: Clone>(items: &[T], size: NonZeroUsize) -> Vec<Vec<T>> {
    items.chunks(size.get()).map(<[T]>::to_vec).collect()
}
