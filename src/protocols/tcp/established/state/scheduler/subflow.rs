// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The subflow side of the scheduler's data model (spec's `S`).
//!
//! Congestion state lives here as plain `Cell<_>` fields rather than
//! behind a `CongestionControl` trait object (see `congestion_ctrl/cubic.rs`
//! for that idiom elsewhere in the stack) because the algorithm that would
//! drive slow start / congestion avoidance is an external collaborator the
//! scheduler only ever reads from or pokes two fields of (`cwnd`,
//! `ssthresh` — spec.md §6).

use super::chrono::Chrono;
use super::scratch::SchedScratch;
use crate::protocols::tcp::SeqNumber;
use std::cell::{Cell, RefCell};

/// `icsk_ca_state` from the carrier contract (spec.md §3, §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaState {
    Open,
    Disorder,
    Cwr,
    Recovery,
    Loss,
}

/// One leg of a multipath connection (spec.md §3: `S`).
pub struct Subflow {
    /// Stable for the subflow's lifetime; unique within a connection.
    /// Valid range is `1..=63` so `path_mask` fits a `u64` (spec.md §6
    /// widens the original's 32-bit mask).
    path_index: u8,

    pub cwnd: Cell<u32>,
    pub ssthresh: Cell<u32>,
    pub snd_una: Cell<SeqNumber>,
    pub snd_nxt: Cell<SeqNumber>,
    pub high_seq: Cell<SeqNumber>,
    pub write_seq: Cell<SeqNumber>,
    pub wnd_end: Cell<SeqNumber>,
    pub srtt_us: Cell<u32>,
    pub mss_now: Cell<u32>,
    pub gso_max_segs: Cell<u16>,
    pub ca_state: Cell<CaState>,
    pub is_reno: Cell<bool>,

    pub fully_established: Cell<bool>,
    pub pre_established: Cell<bool>,
    pub second_packet: Cell<bool>,
    /// "Potentially failed" — set by failover detection, external to this
    /// crate (spec.md §1 Non-goals).
    pub pf: Cell<bool>,
    pub low_prio: Cell<bool>,
    pub rcv_low_prio: Cell<bool>,
    pub last_end_data_seq: Cell<SeqNumber>,

    /// Whether the connection's send/receive path currently considers this
    /// subflow to be in a sendable state at all (spec.md §4.1
    /// `def_unavailable`'s first clause, "not in a sendable connection
    /// state"). Handshake/teardown bookkeeping external to this crate
    /// flips this; the scheduler only reads it.
    pub sendable: Cell<bool>,

    /// This subflow's own chrono, distinct from the meta connection's
    /// (spec.md §4.4 step 3: the send-buffer-limited chrono can land on
    /// either, depending on whether `rcv_buf_opt` found something to send).
    pub chrono: Chrono,

    scratch: RefCell<Option<Box<dyn SchedScratch>>>,
}

impl Subflow {
    pub fn new(path_index: u8) -> Self {
        assert!(
            (1..=63).contains(&path_index),
            "path_index must be in 1..=63, got {}",
            path_index
        );
        Self {
            path_index,
            cwnd: Cell::new(0),
            ssthresh: Cell::new(u32::MAX),
            snd_una: Cell::new(SeqNumber::default()),
            snd_nxt: Cell::new(SeqNumber::default()),
            high_seq: Cell::new(SeqNumber::default()),
            write_seq: Cell::new(SeqNumber::default()),
            wnd_end: Cell::new(SeqNumber::default()),
            srtt_us: Cell::new(0),
            mss_now: Cell::new(1460),
            gso_max_segs: Cell::new(1),
            ca_state: Cell::new(CaState::Open),
            is_reno: Cell::new(false),
            fully_established: Cell::new(true),
            pre_established: Cell::new(false),
            second_packet: Cell::new(false),
            pf: Cell::new(false),
            low_prio: Cell::new(false),
            rcv_low_prio: Cell::new(false),
            last_end_data_seq: Cell::new(SeqNumber::default()),
            sendable: Cell::new(true),
            chrono: Chrono::default(),
            scratch: RefCell::new(None),
        }
    }

    pub fn path_index(&self) -> u8 {
        self.path_index
    }

    /// `path_mask(S) = 1 << path_index` (spec.md §3, §6).
    pub fn path_mask(&self) -> u64 {
        1u64 << self.path_index
    }

    /// Active iff neither priority flag marks it as backup (spec.md §4.2).
    pub fn is_active(&self) -> bool {
        !self.low_prio.get() && !self.rcv_low_prio.get()
    }

    /// Backup iff either priority flag is set (spec.md §4.2).
    pub fn is_backup(&self) -> bool {
        self.low_prio.get() || self.rcv_low_prio.get()
    }

    /// Bytes outstanding between `snd_una` and `snd_nxt` (spec.md §3:
    /// "in_flight (derived)"). The real accounting also subtracts SACKed
    /// and adds retransmitted bytes; that scoreboard lives in the
    /// congestion controller this crate doesn't own, so this is the
    /// simplest honest approximation the scheduler's contract needs.
    pub fn in_flight(&self) -> u32 {
        self.snd_nxt.get() - self.snd_una.get()
    }

    /// Installs this scheduler's private scratch region, replacing any
    /// previous one (spec.md §4.5 `init(S)`, §5 "owned by the subflow and
    /// zero-initialised in `init` before first use").
    pub fn install_scratch<T: SchedScratch + 'static>(&self, value: T) {
        *self.scratch.borrow_mut() = Some(Box::new(value));
    }

    /// Runs `f` with the scratch region downcast to `T`, if one of that
    /// type is installed.
    pub fn with_scratch<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let scratch = self.scratch.borrow();
        scratch
            .as_ref()
            .and_then(|s| s.as_any().downcast_ref::<T>())
            .map(f)
    }

    /// Runs `f` with mutable access to the scratch region downcast to
    /// `T`, if one of that type is installed.
    pub fn with_scratch_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut scratch = self.scratch.borrow_mut();
        scratch
            .as_mut()
            .and_then(|s| s.as_any_mut().downcast_mut::<T>())
            .map(f)
    }
}
