// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Availability predicates (spec.md §4.1) — cheap, stateless classifiers
//! the selector runs once per candidate subflow per pass.

use super::segment::Segment;
use super::subflow::{CaState, Subflow};

/// `mptcp_is_def_unavailable` — a subflow that cannot carry data until a
/// state change *external to the scheduler* clears the condition.
pub fn def_unavailable(subflow: &Subflow) -> bool {
    if !subflow.sendable.get() {
        return true;
    }
    if subflow.pre_established.get() {
        return true;
    }
    if subflow.pf.get() {
        return true;
    }
    false
}

/// `mptcp_is_temp_unavailable` — a subflow that cannot carry `segment`
/// *right now*, but might become available again without any external
/// state change (cwnd opening up, handshake completing, etc).
pub fn temp_unavailable(subflow: &Subflow, segment: Option<&Segment>, zero_wnd_test: bool) -> bool {
    if subflow.ca_state.get() == CaState::Loss {
        let still_recovering = !subflow.is_reno.get() || subflow.snd_una.get() != subflow.high_seq.get();
        if still_recovering {
            return true;
        }
    }

    if !subflow.fully_established.get() {
        if let Some(segment) = segment {
            if subflow.second_packet.get() && segment.seq != subflow.last_end_data_seq.get() {
                return true;
            }
        }
    }

    let in_flight = subflow.in_flight();
    if in_flight >= subflow.cwnd.get() {
        return true;
    }

    let mss_now = subflow.mss_now.get().max(1);
    let space = (subflow.cwnd.get() - in_flight) * mss_now;
    if subflow.write_seq.get() - subflow.snd_nxt.get() >= space {
        return true;
    }

    if zero_wnd_test && !subflow.write_seq.get().before(subflow.wnd_end.get()) {
        return true;
    }

    if zero_wnd_test {
        if let Some(segment) = segment {
            let first_chunk = segment.len.min(mss_now);
            if (segment.seq + first_chunk).after(subflow.wnd_end.get()) {
                return true;
            }
        }
    }

    false
}

/// `mptcp_is_available`.
pub fn available(subflow: &Subflow, segment: Option<&Segment>, zero_wnd_test: bool) -> bool {
    !def_unavailable(subflow) && !temp_unavailable(subflow, segment, zero_wnd_test)
}

/// `mptcp_dont_reinject_skb` — true if `segment` has already been carried
/// by `subflow` and we should therefore look elsewhere first.
pub fn dont_reinject(subflow: &Subflow, segment: Option<&Segment>) -> bool {
    match segment {
        Some(segment) => (segment.path_mask() & subflow.path_mask()) != 0,
        None => false,
    }
}
