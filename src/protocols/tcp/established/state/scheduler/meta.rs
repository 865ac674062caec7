// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The meta connection (spec's `M`) — owns the subflow set and the three
//! queues the scheduler peeks from, plus the bits of send-buffer/receive-
//! window state `next_segment` needs to decide between them.
//!
//! Everything this module exposes beyond plain storage (`snd_wnd_test`,
//! `cwnd_test`, `mss_now`) is, per spec.md §1/§6, really owned by
//! collaborators outside this crate (the TCP window/cwnd math, the queue
//! storage engine). `MetaConnection` implements honest, minimal versions
//! of those contracts so the scheduler has something real to call and the
//! test suite has something real to drive — not a production window/cwnd
//! implementation.

use super::chrono::{Chrono, ChronoKind};
use super::registry::SchedulerEntry;
use super::segment::Segment;
use super::subflow::Subflow;
use crate::runtime::Clock;
use std::{
    cell::{Cell, Ref, RefCell},
    collections::VecDeque,
    rc::Rc,
    sync::Arc,
};

pub struct MetaConnection<C: Clock> {
    clock: C,

    subflows: RefCell<Vec<Rc<Subflow>>>,

    send_queue: RefCell<VecDeque<Rc<Segment>>>,
    reinject_queue: RefCell<VecDeque<Rc<Segment>>>,
    retransmit_queue: RefCell<VecDeque<Rc<Segment>>>,

    recv_shutdown: Cell<bool>,
    dfin_path_index: Cell<Option<u8>>,

    infinite_mapping_snd: Cell<bool>,
    send_infinite_mapping: Cell<bool>,

    /// Mirrors `SOCK_NOSPACE` + `sk_stream_wspace`/`sk_stream_min_wspace`
    /// (spec.md §4.4 step 3).
    sock_nospace: Cell<bool>,
    wspace: Cell<u32>,
    min_wspace: Cell<u32>,
    /// Mirrors `sk_stream_memory_free` (spec.md §4.3 step 2).
    stream_memory_free: Cell<bool>,
    /// Stands in for `tcp_snd_wnd_test` at the meta level (spec.md §4.4
    /// step 5) — an external window-accounting contract this crate does
    /// not own; tests drive it directly.
    snd_wnd_ok: Cell<bool>,

    pub chrono: Chrono,

    scheduler: RefCell<Option<Arc<SchedulerEntry>>>,
}

impl<C: Clock> MetaConnection<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            subflows: RefCell::new(Vec::new()),
            send_queue: RefCell::new(VecDeque::new()),
            reinject_queue: RefCell::new(VecDeque::new()),
            retransmit_queue: RefCell::new(VecDeque::new()),
            recv_shutdown: Cell::new(false),
            dfin_path_index: Cell::new(None),
            infinite_mapping_snd: Cell::new(false),
            send_infinite_mapping: Cell::new(false),
            sock_nospace: Cell::new(false),
            wspace: Cell::new(u32::MAX),
            min_wspace: Cell::new(0),
            stream_memory_free: Cell::new(true),
            snd_wnd_ok: Cell::new(true),
            chrono: Chrono::default(),
            scheduler: RefCell::new(None),
        }
    }

    pub fn now(&self) -> std::time::Instant {
        self.clock.now()
    }

    // -- subflow set -----------------------------------------------------

    pub fn add_subflow(&self, subflow: Rc<Subflow>) {
        self.subflows.borrow_mut().push(subflow);
    }

    pub fn subflows(&self) -> Ref<'_, Vec<Rc<Subflow>>> {
        self.subflows.borrow()
    }

    pub fn subflow_by_path_index(&self, path_index: u8) -> Option<Rc<Subflow>> {
        self.subflows
            .borrow()
            .iter()
            .find(|s| s.path_index() == path_index)
            .cloned()
    }

    // -- queues ------------------------------------------------------------

    pub fn push_send(&self, segment: Rc<Segment>) {
        self.send_queue.borrow_mut().push_back(segment);
    }

    pub fn push_reinject(&self, segment: Rc<Segment>) {
        self.reinject_queue.borrow_mut().push_back(segment);
    }

    pub fn set_retransmit_head(&self, segment: Rc<Segment>) {
        self.retransmit_queue.borrow_mut().push_front(segment);
    }

    /// `tcp_send_head(meta_sk)` (spec.md §6).
    pub fn send_head(&self) -> Option<Rc<Segment>> {
        self.send_queue.borrow().front().cloned()
    }

    /// `tcp_rtx_queue_head(meta_sk)` (spec.md §4.3 step 1).
    pub fn retransmit_head(&self) -> Option<Rc<Segment>> {
        self.retransmit_queue.borrow().front().cloned()
    }

    /// `skb_peek(&mpcb->reinject_queue)` (spec.md §4.4 step 2).
    pub fn reinject_peek(&self) -> Option<Rc<Segment>> {
        self.reinject_queue.borrow().front().cloned()
    }

    // -- shutdown / fallback / dfin -----------------------------------------

    pub fn recv_shutdown(&self) -> bool {
        self.recv_shutdown.get()
    }

    pub fn set_recv_shutdown(&self, shutdown: bool) {
        self.recv_shutdown.set(shutdown);
    }

    pub fn dfin_path_index(&self) -> Option<u8> {
        self.dfin_path_index.get()
    }

    pub fn set_dfin_path_index(&self, path_index: Option<u8>) {
        self.dfin_path_index.set(path_index);
    }

    /// `mpcb->infinite_mapping_snd || mpcb->send_infinite_mapping`
    /// (spec.md §4.4 step 1).
    pub fn is_fallback(&self) -> bool {
        self.infinite_mapping_snd.get() || self.send_infinite_mapping.get()
    }

    pub fn set_infinite_mapping_snd(&self, value: bool) {
        self.infinite_mapping_snd.set(value);
    }

    pub fn set_send_infinite_mapping(&self, value: bool) {
        self.send_infinite_mapping.set(value);
    }

    // -- send-buffer / window contracts -------------------------------------

    pub fn set_sock_nospace(&self, value: bool) {
        self.sock_nospace.set(value);
    }

    pub fn set_wspace(&self, wspace: u32, min_wspace: u32) {
        self.wspace.set(wspace);
        self.min_wspace.set(min_wspace);
    }

    pub fn set_stream_memory_free(&self, value: bool) {
        self.stream_memory_free.set(value);
    }

    pub fn set_snd_wnd_ok(&self, value: bool) {
        self.snd_wnd_ok.set(value);
    }

    /// `meta_sk->sk_socket && SOCK_NOSPACE set && wspace < min_wspace`
    /// (spec.md §4.4 step 3).
    pub fn is_sndbuf_limited(&self) -> bool {
        self.sock_nospace.get() && self.wspace.get() < self.min_wspace.get()
    }

    /// `sk_stream_memory_free(meta_sk)` (spec.md §4.3 step 2).
    pub fn stream_memory_free(&self) -> bool {
        self.stream_memory_free.get()
    }

    /// `tcp_snd_wnd_test(tcp_sk(meta_sk), skb, mss_now)` (spec.md §4.4
    /// step 5) — external window-accounting contract; see module docs.
    pub fn snd_wnd_test(&self, _segment: &Segment) -> bool {
        self.snd_wnd_ok.get()
    }

    /// `tcp_cwnd_test(subtp, skb)` (spec.md §4.4 step 8) — "how many
    /// packets may this cwnd still carry given what is already queued";
    /// external contract, see module docs.
    pub fn cwnd_test(&self, subflow: &Subflow) -> u32 {
        let mss = subflow.mss_now.get().max(1);
        subflow.cwnd.get().saturating_sub(subflow.in_flight()) / mss
    }

    /// `tcp_current_mss(sk)` (spec.md §4.4, §6).
    pub fn mss_now(&self, subflow: &Subflow) -> u32 {
        subflow.mss_now.get()
    }

    pub fn start_chrono(&self, kind: ChronoKind) {
        self.chrono.start(kind, self.now());
    }

    // -- scheduler binding ---------------------------------------------------

    pub fn bound_scheduler(&self) -> Option<Arc<SchedulerEntry>> {
        self.scheduler.borrow().clone()
    }

    pub(super) fn set_bound_scheduler(&self, entry: Option<Arc<SchedulerEntry>>) {
        *self.scheduler.borrow_mut() = entry;
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::runtime::TestClock;

    pub fn meta_with_subflows(srtts: &[(u8, u32)]) -> MetaConnection<TestClock> {
        let meta = MetaConnection::new(TestClock::new(std::time::Instant::now()));
        for &(path_index, srtt_us) in srtts {
            meta.add_subflow(Rc::new(crate::protocols::tcp::established::state::scheduler::subflow::test_helpers::subflow(
                path_index, srtt_us,
            )));
        }
        meta
    }
}
