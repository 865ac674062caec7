// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wrapping sequence-number arithmetic, shared by the meta-level sequence
//! space (`Segment::seq`/`end_seq`) and the per-subflow send variables
//! (`snd_una`, `snd_nxt`, `write_seq`, `high_seq`, `wnd_end`).

use std::{
    num::Wrapping,
    ops::{Add, Sub},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeqNumber(pub Wrapping<u32>);

impl SeqNumber {
    pub fn new(value: u32) -> Self {
        Self(Wrapping(value))
    }

    pub fn value(self) -> u32 {
        (self.0).0
    }

    /// `self < other`, accounting for wraparound (RFC 1323 `before`).
    pub fn before(self, other: Self) -> bool {
        (self.value().wrapping_sub(other.value()) as i32) < 0
    }

    /// `self > other`, accounting for wraparound (RFC 1323 `after`).
    pub fn after(self, other: Self) -> bool {
        other.before(self)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl Add<u32> for SeqNumber {
    type Output = Self;
    fn add(self, rhs: u32) -> Self {
        Self(self.0 + Wrapping(rhs))
    }
}

/// Distance between two sequence numbers, in bytes, via wrapping
/// unsigned subtraction rather than a panicking one — the same plain
/// `a - b` on `u32`-ish sequence counters the original relies on (e.g.
/// `tp->write_seq - tp->snd_nxt`). When `self` precedes `other` this
/// wraps around to a value near `u32::MAX` instead of saturating at
/// zero; callers already know which side is ahead before subtracting
/// (see `cubic.rs`'s `ack_seq_no_diff` handling of the same situation).
impl Sub for SeqNumber {
    type Output = u32;
    fn sub(self, rhs: Self) -> u32 {
        self.value().wrapping_sub(rhs.value())
    }
}
