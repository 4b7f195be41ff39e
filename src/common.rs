pub(crate) mod builder_utils;
pub(crate) mod deque;
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test_utils;

/// The LRU segment an item is linked into.
///
/// Freshly inserted (and resurrected) items start in `Younger`. A touched item is
/// promoted to `Older` when the shard drains its touch buffer, and an item that
/// has not been touched for a while is demoted back to `Younger` by the trimming
/// algorithm. Only `Younger` items are ever evicted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Younger = 0,
    Older = 1,
}

impl Segment {
    #[cfg(test)]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Younger => "younger",
            Self::Older => "older",
        }
    }
}
