//! Fragment offsets and the wrapping fragment id
//!
//! The device only ever sees an 8-bit fragment id. The sender keeps a rollover
//! counter next to it so that `rollover_count * 256 + fragment_id` is the
//! absolute index of the fragment in the image.

use crate::MAXIMUM_FRAGMENT_ID;

const FRAGMENT_ID_SPAN: usize = MAXIMUM_FRAGMENT_ID as usize + 1;

/// Slice `index`-th chunk of `chunk_size` bytes out of `data`.
///
/// The last chunk is clipped to the end of the data. An index past the end
/// gives an empty slice.
pub fn chunk(data: &[u8], chunk_size: usize, index: usize) -> &[u8] {
    let Some(start) = chunk_size.checked_mul(index) else {
        return &[];
    };
    if start >= data.len() {
        return &[];
    }
    let end = start.saturating_add(chunk_size).min(data.len());
    &data[start..end]
}

/// Tracks the next fragment id to send and how often it has wrapped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentSequencer {
    fragment_id: u8,
    rollover_count: usize,
}

impl FragmentSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragment_id(&self) -> u8 {
        self.fragment_id
    }

    pub fn rollover_count(&self) -> usize {
        self.rollover_count
    }

    /// Absolute index of the next fragment in the image
    pub fn absolute_index(&self) -> usize {
        FRAGMENT_ID_SPAN * self.rollover_count + self.fragment_id as usize
    }

    /// The payload of the next fragment
    pub fn next_chunk<'a>(&self, data: &'a [u8], chunk_size: usize) -> &'a [u8] {
        chunk(data, chunk_size, self.absolute_index())
    }

    /// Move on to the next fragment id, wrapping 255 -> 0.
    pub fn advance(&mut self) {
        if self.fragment_id == MAXIMUM_FRAGMENT_ID {
            self.fragment_id = 0;
            self.rollover_count += 1;
        } else {
            self.fragment_id += 1;
        }
    }

    /// Adopt the fragment id the device reported in XOFF, XON or SYNC_LOST.
    ///
    /// A reported id ahead of ours means the device has not yet seen the wrap
    /// we already counted, so the rollover counter steps back by one. The
    /// counter never goes below zero; a duplicate or reordered report may
    /// still leave it one off.
    pub fn resync(&mut self, received_fragment_id: u8) {
        if received_fragment_id > self.fragment_id {
            self.rollover_count = self.rollover_count.saturating_sub(1);
        }
        self.fragment_id = received_fragment_id;
    }
}
