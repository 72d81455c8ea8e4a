#![forbid(unsafe_code)]

//! Segment lock word codec.
//!
//! Each segment header carries one u64 lock word. Normal operations set the
//! write bit for the duration of a mutation, so a word that is not
//! [`LockState::CLEAR`] when the table is opened is evidence of a crash.

use std::fmt;

const READ_COUNT_MASK: u64 = (1 << 30) - 1;
const UPDATE_BIT: u64 = 1 << 30;
const WRITE_BIT: u64 = 1 << 31;
const WAIT_SHIFT: u32 = 32;

/// Decoded view of a segment lock word.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    /// Number of read locks held.
    pub readers: u32,
    /// Whether the update lock is held.
    pub update: bool,
    /// Whether the write lock is held.
    pub write: bool,
    /// Number of writers waiting for the lock.
    pub waiting: u32,
}

impl LockState {
    /// The canonical "clear" lock word.
    pub const CLEAR: u64 = 0;

    /// Decodes a raw lock word.
    pub fn decode(word: u64) -> Self {
        Self {
            readers: (word & READ_COUNT_MASK) as u32,
            update: word & UPDATE_BIT != 0,
            write: word & WRITE_BIT != 0,
            waiting: (word >> WAIT_SHIFT) as u32,
        }
    }

    /// Encodes into a raw lock word. Reader counts beyond 30 bits saturate.
    pub fn encode(self) -> u64 {
        let mut word = u64::from(self.readers).min(READ_COUNT_MASK);
        if self.update {
            word |= UPDATE_BIT;
        }
        if self.write {
            word |= WRITE_BIT;
        }
        word | (u64::from(self.waiting) << WAIT_SHIFT)
    }

    /// Lock word held by a writer mutating the segment.
    pub fn write_locked() -> u64 {
        LockState {
            write: true,
            ..LockState::default()
        }
        .encode()
    }

    /// Returns true if nothing holds or waits on the lock.
    pub fn is_clear(self) -> bool {
        self.encode() == Self::CLEAR
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} update={} write={} waiting={}",
            self.readers, self.update, self.write, self.waiting
        )
    }
}
