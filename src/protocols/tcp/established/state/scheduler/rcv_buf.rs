// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The receive-buffer reinjection optimiser (spec.md §4.3):
//! `mptcp_rcv_buf_optimization` in the original. When the application on
//! the receive side is slow to drain, a subflow can sit idle waiting for
//! an ack that a slower sibling subflow is holding up; this module
//! penalises that sibling and opportunistically resends its unacked head
//! on the faster path.
//!
//! `last_rbuf_opti` — "don't re-penalize more than once per RTT" — is
//! private to this scheduler, so it lives behind `Subflow::with_scratch`
//! (spec.md §4.5 `init`) rather than as a field every scheduler pays for.

use super::availability::available;
use super::meta::MetaConnection;
use super::segment::Segment;
use super::subflow::{CaState, Subflow};
use crate::runtime::Clock;
use std::{
    rc::Rc,
    time::{Duration, Instant},
};

/// This scheduler's per-subflow private state (spec.md §4.5 `priv`).
/// The subflow's scratch slot is already behind a `RefCell` (see
/// `Subflow::with_scratch`/`with_scratch_mut`), so `last_rbuf_opti`
/// doesn't need its own `Cell` on top of that.
pub struct RbufOptScratch {
    last_rbuf_opti: Instant,
}

impl RbufOptScratch {
    pub fn new(now: Instant) -> Self {
        Self { last_rbuf_opti: now }
    }
}

/// Installs a freshly-stamped scratch region on `subflow`, as the
/// scheduler's `init(S)` hook does on subflow creation (spec.md §4.5).
pub fn init_subflow(subflow: &Subflow, now: Instant) {
    subflow.install_scratch(RbufOptScratch::new(now));
}

/// `mptcp_rcv_buf_optimization` (spec.md §4.3). `penal` mirrors the C
/// call sites: `true` when called from the rwnd-limited path (always
/// penalize), `false` when called from the sndbuf-limited path (only
/// penalize if the meta is also out of receive-buffer memory).
pub fn rcv_buf_opt<C: Clock>(
    meta: &MetaConnection<C>,
    subflow: &Subflow,
    penal: bool,
) -> Option<Rc<Segment>> {
    let skb_head = meta.retransmit_head()?;

    let should_penalize = penal || !meta.stream_memory_free();
    if should_penalize {
        let elapsed_since_last_opti = subflow
            .with_scratch::<RbufOptScratch, _>(|s| meta.now().saturating_duration_since(s.last_rbuf_opti))
            .unwrap_or(Duration::MAX);
        let cooldown = Duration::from_micros((subflow.srtt_us.get() >> 3) as u64);

        if elapsed_since_last_opti >= cooldown {
            penalize_slower_co_carriers(meta, subflow, &skb_head);
        }
    }

    // Segment not yet injected into this path? Take it.
    if skb_head.path_mask() & subflow.path_mask() != 0 {
        return None;
    }

    let do_retrans = co_carriers_justify_retransmit(meta, subflow, &skb_head);
    if do_retrans && available(subflow, Some(&skb_head), false) {
        return Some(skb_head);
    }
    None
}

/// Halves the cwnd (floor 1) of every other subflow that is both slower
/// and already carrying `skb_head`, provided it is in `Open` state —
/// this is the only place outside the (external) congestion controller
/// that this crate writes `cwnd`/`ssthresh` (spec.md §6).
fn penalize_slower_co_carriers<C: Clock>(meta: &MetaConnection<C>, subflow: &Subflow, skb_head: &Segment) {
    let mut penalized = false;
    for other in meta.subflows().iter() {
        if std::ptr::eq(other.as_ref(), subflow) {
            continue;
        }
        if skb_head.path_mask() & other.path_mask() == 0 {
            continue;
        }
        if subflow.srtt_us.get() < other.srtt_us.get() && other.ca_state.get() == CaState::Open {
            let prior_cwnd = other.cwnd.get();
            other.cwnd.set((other.cwnd.get() >> 1).max(1));
            if prior_cwnd >= other.ssthresh.get() {
                other.ssthresh.set((other.ssthresh.get() >> 1).max(2));
            }
            penalized = true;
        }
    }

    if penalized {
        let now = meta.now();
        subflow.with_scratch_mut::<RbufOptScratch, _>(|s| s.last_rbuf_opti = now);
    }
}

/// Decides whether the slower co-carrier(s) of `skb_head` are stuck
/// badly enough (cwnd `<= 4`) or slow enough (`4 * our srtt >= theirs`
/// does NOT hold) to justify reinjecting onto `subflow` instead of
/// waiting for them.
fn co_carriers_justify_retransmit<C: Clock>(meta: &MetaConnection<C>, subflow: &Subflow, skb_head: &Segment) -> bool {
    let mut do_retrans = false;
    for other in meta.subflows().iter() {
        if std::ptr::eq(other.as_ref(), subflow) {
            continue;
        }
        if skb_head.path_mask() & other.path_mask() == 0 {
            continue;
        }
        if other.cwnd.get() <= 4 {
            do_retrans = true;
            break;
        }
        if 4 * subflow.srtt_us.get() >= other.srtt_us.get() {
            do_retrans = false;
            break;
        }
        do_retrans = true;
    }
    do_retrans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::tcp::established::state::scheduler::meta::test_helpers::meta_with_subflows;
    use crate::protocols::tcp::SeqNumber;
    use crate::runtime::TestClock;
    use std::time::Duration;

    fn retransmit_ready(meta: &MetaConnection<TestClock>, carried_by: &[u8]) -> Rc<Segment> {
        let seg = Rc::new(Segment::new(SeqNumber::new(0), 100));
        for path_index in carried_by {
            let subflow = meta.subflow_by_path_index(*path_index).unwrap();
            seg.mark_carried_by(subflow.path_mask());
        }
        meta.set_retransmit_head(seg.clone());
        seg
    }

    #[test]
    fn no_retransmit_head_returns_none() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        let a = meta.subflow_by_path_index(1).unwrap();
        for s in meta.subflows().iter() {
            init_subflow(s, meta.now() - Duration::from_secs(10));
        }
        assert!(rcv_buf_opt(&meta, &a, true).is_none());
    }

    #[test]
    fn already_carried_path_is_skipped() {
        let meta = meta_with_subflows(&[(1, 10_000), (2, 20_000)]);
        for s in meta.subflows().iter() {
            init_subflow(s, meta.now() - Duration::from_secs(10));
        }
        let a = meta.subflow_by_path_index(1).unwrap();
        retransmit_ready(&meta, &[1, 2]);
        assert!(rcv_buf_opt(&meta, &a, true).is_none());
    }

    /// Scenario 5 (spec.md §8): B is slow and stuck near-idle (cwnd <= 4);
    /// A is fast and has not carried the retransmit head — A should take
    /// over, and B's cwnd/ssthresh should be halved.
    #[test]
    fn scenario_5_fast_subflow_reinjects_from_stuck_slow_one() {
        let meta = meta_with_subflows(&[(1, 10_000), (2, 100_000)]);
        for s in meta.subflows().iter() {
            init_subflow(s, meta.now() - Duration::from_secs(10));
        }
        let a = meta.subflow_by_path_index(1).unwrap();
        let b = meta.subflow_by_path_index(2).unwrap();
        b.cwnd.set(4);
        b.ssthresh.set(4);

        retransmit_ready(&meta, &[2]);

        let result = rcv_buf_opt(&meta, &a, true);
        assert_eq!(result.map(|_| ()), Some(()));
        assert_eq!(b.cwnd.get(), 2, "cwnd halved with floor 1");
        assert_eq!(b.ssthresh.get(), 2, "ssthresh halved with floor 2");
    }

    #[test]
    fn does_not_penalize_twice_within_one_rtt_equivalent() {
        let meta = meta_with_subflows(&[(1, 10_000), (2, 100_000)]);
        for s in meta.subflows().iter() {
            init_subflow(s, meta.now() - Duration::from_secs(10));
        }
        let a = meta.subflow_by_path_index(1).unwrap();
        let b = meta.subflow_by_path_index(2).unwrap();
        b.ca_state.set(CaState::Open);
        retransmit_ready(&meta, &[2]);

        rcv_buf_opt(&meta, &a, true);
        let cwnd_after_first = b.cwnd.get();
        retransmit_ready(&meta, &[2]); // fresh head, still carried only by b
        rcv_buf_opt(&meta, &a, true);
        assert_eq!(b.cwnd.get(), cwnd_after_first, "cooldown blocks re-penalizing immediately");
    }

    #[test]
    fn co_carrier_fast_enough_blocks_retransmit() {
        let meta = meta_with_subflows(&[(1, 10_000), (2, 20_000)]);
        for s in meta.subflows().iter() {
            init_subflow(s, meta.now() - Duration::from_secs(10));
        }
        let a = meta.subflow_by_path_index(1).unwrap();
        let b = meta.subflow_by_path_index(2).unwrap();
        b.cwnd.set(1000); // not stuck
        retransmit_ready(&meta, &[2]);
        // 4 * 10_000 >= 20_000 -> co-carrier deemed fast enough, no retransmit
        assert!(rcv_buf_opt(&meta, &a, true).is_none());
    }
}
