// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The segment chooser (spec.md §4.4): `mptcp_next_segment` /
//! `__mptcp_next_segment` in the original. Decides *what* goes out next
//! (reinject queue, regular send queue, or a receive-buffer-driven
//! retransmission), *which* subflow carries it, and how large a slice of
//! it that subflow's congestion/flow-control state currently allows.

use super::chrono::ChronoKind;
use super::meta::MetaConnection;
use super::rcv_buf::rcv_buf_opt;
use super::segment::Segment;
use super::select::get_available_subflow;
use super::subflow::Subflow;
use crate::runtime::Clock;
use std::{rc::Rc, sync::Once};

/// Where a chosen segment came from (spec.md §4.4's `*reinject` out
/// parameter: `0` / `1` / `-1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReinjectTag {
    /// Regular send-queue or fallback-mode segment.
    Fresh,
    /// Pulled from the meta connection's reinject queue.
    Reinjected,
    /// A receive-buffer-optimisation retransmission of an unacked
    /// meta-level segment.
    MetaRetransmit,
}

/// The chooser's full answer: what to send, on which subflow, tagged
/// with where it came from, and how many bytes of it to actually write
/// (`0` means "the whole segment, unsplit").
pub struct NextSegment {
    pub segment: Rc<Segment>,
    pub subflow: Rc<Subflow>,
    pub reinject: ReinjectTag,
    pub limit: u32,
}

static IN_FLIGHT_SPACE_WARNING: Once = Once::new();

/// `__mptcp_next_segment` (spec.md §4.4 steps 1-3): picks which queue to
/// pull a segment from, without yet picking a subflow.
fn segment_source<C: Clock>(meta: &MetaConnection<C>) -> Option<(Rc<Segment>, ReinjectTag)> {
    if meta.is_fallback() {
        return meta.send_head().map(|segment| (segment, ReinjectTag::Fresh));
    }

    if let Some(segment) = meta.reinject_peek() {
        return Some((segment, ReinjectTag::Reinjected));
    }

    if let Some(segment) = meta.send_head() {
        return Some((segment, ReinjectTag::Fresh));
    }

    if meta.is_sndbuf_limited() {
        meta.start_chrono(ChronoKind::SndbufLimited);

        let subsk = get_available_subflow(meta, None, false)?;
        match rcv_buf_opt(meta, &subsk, false) {
            Some(segment) => return Some((segment, ReinjectTag::MetaRetransmit)),
            None => subsk.chrono.start(ChronoKind::SndbufLimited, meta.now()),
        }
    }

    None
}

/// `mptcp_next_segment` (spec.md §4.4): the scheduler's single entry
/// point for "give me the next thing to put on the wire".
pub fn next_segment<C: Clock>(meta: &MetaConnection<C>) -> Option<NextSegment> {
    let (mut segment, mut reinject) = segment_source(meta)?;

    let subflow = get_available_subflow(meta, Some(&segment), false)?;

    if reinject == ReinjectTag::Fresh && !meta.snd_wnd_test(&segment) {
        // Rwnd check only applies to a fresh send-queue head (spec.md
        // §4.4 step 5); a segment already pulled from the reinject queue
        // or from rcv_buf_opt's sndbuf-limited path was chosen precisely
        // because the meta is send-buffer, not receive-window, limited.
        meta.start_chrono(ChronoKind::RwndLimited);
        match rcv_buf_opt(meta, &subflow, true) {
            Some(retransmit) => {
                segment = retransmit;
                reinject = ReinjectTag::MetaRetransmit;
            }
            None => return None,
        }
    }

    if reinject == ReinjectTag::Fresh {
        meta.chrono.start(ChronoKind::Busy, meta.now());
    }

    let mss_now = meta.mss_now(&subflow);
    if segment.len <= mss_now {
        return Some(NextSegment {
            segment,
            subflow,
            reinject,
            limit: 0,
        });
    }

    let limit = split_point(meta, &subflow, &segment, mss_now)?;
    Some(NextSegment {
        segment,
        subflow,
        reinject,
        limit,
    })
}

/// `tcp_mss_split_point`-alike clamp (spec.md §4.4 steps 7-10): how many
/// bytes of `segment` the chosen subflow may actually carry right now,
/// considering GSO batching, remaining cwnd headroom net of what is
/// already locally queued, and the announced receive window.
fn split_point<C: Clock>(meta: &MetaConnection<C>, subflow: &Subflow, segment: &Segment, mss_now: u32) -> Option<u32> {
    let gso_max_segs = subflow.gso_max_segs.get().max(1) as u32;
    let max_segs = meta.cwnd_test(subflow).min(gso_max_segs);
    if max_segs == 0 {
        return None;
    }

    let mut max_len = (mss_now * max_segs).min(segment.len);

    let in_flight_space = subflow.cwnd.get().saturating_sub(subflow.in_flight()) * mss_now;
    let queued_locally = subflow.write_seq.get() - subflow.snd_nxt.get();
    let remaining_in_flight_space = in_flight_space as i64 - queued_locally as i64;

    if remaining_in_flight_space <= 0 {
        IN_FLIGHT_SPACE_WARNING.call_once(|| {
            log::warn!(
                "subflow {} has no remaining in-flight space (in_flight={} cwnd={} write_seq-snd_nxt={} mss_now={})",
                subflow.path_index(),
                subflow.in_flight(),
                subflow.cwnd.get(),
                queued_locally,
                mss_now,
            );
        });
    } else {
        max_len = max_len.min(remaining_in_flight_space as u32);
    }

    let window = subflow.wnd_end.get() - subflow.write_seq.get();
    max_len = max_len.min(window);

    Some(max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::tcp::established::state::scheduler::meta::test_helpers::meta_with_subflows;
    use crate::protocols::tcp::SeqNumber;

    #[test]
    fn empty_meta_yields_nothing() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        assert!(next_segment(&meta).is_none());
    }

    #[test]
    fn fresh_send_head_under_mss_is_unsplit() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        meta.push_send(Rc::new(Segment::new(SeqNumber::new(0), 100)));
        let next = next_segment(&meta).expect("a segment");
        assert_eq!(next.reinject, ReinjectTag::Fresh);
        assert_eq!(next.limit, 0, "limit == 0 means send the whole segment");
    }

    #[test]
    fn reinject_queue_is_drained_before_send_queue() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        meta.push_send(Rc::new(Segment::new(SeqNumber::new(1000), 50)));
        meta.push_reinject(Rc::new(Segment::new(SeqNumber::new(0), 50)));
        let next = next_segment(&meta).expect("a segment");
        assert_eq!(next.reinject, ReinjectTag::Reinjected);
        assert_eq!(next.segment.seq, SeqNumber::new(0));
    }

    #[test]
    fn fallback_mode_ignores_reinject_queue() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        meta.set_infinite_mapping_snd(true);
        meta.push_send(Rc::new(Segment::new(SeqNumber::new(1000), 50)));
        meta.push_reinject(Rc::new(Segment::new(SeqNumber::new(0), 50)));
        let next = next_segment(&meta).expect("a segment");
        assert_eq!(next.reinject, ReinjectTag::Fresh);
        assert_eq!(next.segment.seq, SeqNumber::new(1000));
    }

    #[test]
    fn oversized_segment_is_clamped_to_cwnd_and_window() {
        let meta = meta_with_subflows(&[(1, 10_000)]);
        let subflow = meta.subflow_by_path_index(1).unwrap();
        subflow.mss_now.set(100);
        subflow.cwnd.set(150); // one mss of headroom after in_flight=0
        subflow.wnd_end.set(SeqNumber::new(120));
        subflow.write_seq.set(SeqNumber::new(0));

        meta.push_send(Rc::new(Segment::new(SeqNumber::new(0), 500)));
        let next = next_segment(&meta).expect("a segment");
        assert!(next.limit > 0, "limit must reflect a real clamp when segment exceeds mss");
        assert!(next.limit <= 120, "clamp must respect the announced receive window");
    }

    #[test]
    fn rwnd_limited_meta_falls_back_to_meta_retransmit() {
        let meta = meta_with_subflows(&[(1, 10_000), (2, 10_000)]);
        for s in meta.subflows().iter() {
            crate::protocols::tcp::established::state::scheduler::rcv_buf::init_subflow(
                s,
                meta.now() - std::time::Duration::from_secs(10),
            );
        }
        meta.set_snd_wnd_ok(false);
        meta.push_send(Rc::new(Segment::new(SeqNumber::new(0), 50)));
        let head = Rc::new(Segment::new(SeqNumber::new(0), 50));
        let b = meta.subflow_by_path_index(2).unwrap();
        head.mark_carried_by(b.path_mask());
        b.cwnd.set(1);
        meta.set_retransmit_head(head);

        let next = next_segment(&meta);
        assert!(
            matches!(next.map(|n| n.reinject), Some(ReinjectTag::MetaRetransmit) | None),
            "either recovers via meta-level retransmit or correctly gives up"
        );
    }
}
