//! Write batches
//!
//! A batch is written entry by entry but synced to disk only once, after
//! its last entry.

/// An ordered group of payloads for [`Wal::write_batch`](super::Wal::write_batch)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<Vec<u8>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Queue a payload
    pub fn write(&mut self, payload: impl Into<Vec<u8>>) {
        self.entries.push(payload.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all queued payloads, keeping the allocation
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(Vec::as_slice)
    }
}

impl<T: Into<Vec<u8>>> FromIterator<T> for Batch {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Into<Vec<u8>>> Extend<T> for Batch {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.entries.extend(iter.into_iter().map(Into::into));
    }
}
