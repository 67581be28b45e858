//! Segment Directory
//!
//! The ordered set of segments that together make up the log. Segments are
//! sorted by start index and cover `[first_index, last_index)` without gaps;
//! the last one is the active segment.

use crate::error::{Result, WalError};

use super::segment::Segment;

/// Ordered collection of segments
#[derive(Debug, Default)]
pub struct SegmentDirectory {
    segments: Vec<Segment>,
}

impl SegmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from segments already sorted by start index.
    ///
    /// Fails if any segment does not start exactly where the previous one
    /// ends.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self> {
        for pair in segments.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.next_index() != next.first_index() {
                return Err(WalError::Decode(format!(
                    "segment {} ends at index {} but {} starts at {}",
                    prev.path().display(),
                    prev.next_index(),
                    next.path().display(),
                    next.first_index()
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Position of the rightmost segment with `start_index <= index`
    pub fn find_segment(&self, index: u64) -> Option<usize> {
        let pos = self.segments.partition_point(|s| s.first_index() <= index);
        pos.checked_sub(1)
    }

    /// Remove and return every segment strictly before `position`
    pub fn splice_out_before(&mut self, position: usize) -> Vec<Segment> {
        let position = position.min(self.segments.len());
        self.segments.drain(..position).collect()
    }

    /// Append a segment (the new active one)
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn get(&self, position: usize) -> Option<&Segment> {
        self.segments.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Segment> {
        self.segments.get_mut(position)
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    /// Whether `position` refers to the active (last) segment
    pub fn is_active(&self, position: usize) -> bool {
        position + 1 == self.segments.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total entries across all segments
    pub fn entry_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}
