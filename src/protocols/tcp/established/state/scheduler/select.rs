// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The subflow selector (spec.md §4.2): `pick` scans one class of
//! subflows (active or backup) and `get_available_subflow` drives the
//! active-then-backup, at-most-one-restart dance around it.

use super::availability::{available, def_unavailable, dont_reinject, temp_unavailable};
use super::meta::MetaConnection;
use super::segment::Segment;
use super::subflow::Subflow;
use crate::runtime::Clock;
use std::rc::Rc;

/// Scans every subflow for which `classifier` holds and returns the
/// lowest-`srtt_us` usable candidate, preferring subflows `segment` has
/// not yet been sent on (spec.md §4.2).
///
/// `force` tells the caller whether this result should be treated as
/// final: `true` means either a fresh candidate was found, or every
/// not-yet-tried candidate was merely temporarily unavailable (so
/// retrying the other subflow class is pointless); `false` means the
/// best we found was a subflow this segment already visited, and a
/// not-yet-tried candidate might still turn up in the other class.
pub fn pick<C: Clock>(
    classifier: impl Fn(&Subflow) -> bool,
    meta: &MetaConnection<C>,
    segment: Option<&Segment>,
    zero_wnd_test: bool,
) -> (Option<Rc<Subflow>>, bool) {
    let mut best: Option<Rc<Subflow>> = None;
    let mut best_srtt = u32::MAX;
    let mut found_unused = false;
    let mut found_unused_una = false;

    for subflow in meta.subflows().iter() {
        if !classifier(subflow) {
            continue;
        }

        let unused = !dont_reinject(subflow, segment);
        if found_unused && !unused {
            continue;
        }

        if def_unavailable(subflow) {
            continue;
        }

        if temp_unavailable(subflow, segment, zero_wnd_test) {
            if unused {
                found_unused_una = true;
            }
            continue;
        }

        if unused && !found_unused {
            best = None;
            best_srtt = u32::MAX;
            found_unused = true;
        }

        if subflow.srtt_us.get() < best_srtt {
            best_srtt = subflow.srtt_us.get();
            best = Some(subflow.clone());
        }
    }

    let force = if best.is_some() {
        found_unused
    } else {
        found_unused_una
    };
    (best, force)
}

/// `get_available_subflow` (spec.md §4.2): the scheduler's top-level
/// "which subflow should carry this" entry point.
pub fn get_available_subflow<C: Clock>(
    meta: &MetaConnection<C>,
    segment: Option<&Segment>,
    zero_wnd_test: bool,
) -> Option<Rc<Subflow>> {
    if meta.recv_shutdown() {
        if let Some(seg) = segment {
            if seg.is_data_fin {
                if let Some(dfin_path_index) = meta.dfin_path_index() {
                    if let Some(candidate) = meta.subflow_by_path_index(dfin_path_index) {
                        if available(&candidate, segment, zero_wnd_test) {
                            return Some(candidate);
                        }
                    }
                }
            }
        }
    }

    let mut restarted = false;
    loop {
        let (active_best, force) = pick(Subflow::is_active, meta, segment, zero_wnd_test);
        if force {
            return active_best;
        }

        let (backup_best, force) = pick(Subflow::is_backup, meta, segment, zero_wnd_test);
        if !force && segment.is_some() {
            // The segment has exhausted every subflow on both passes;
            // clear its path mask (spec.md §3, §4.2 step 3) and, unless
            // we already did so once, restart from the active pass.
            segment.unwrap().clear_path_mask();
            if !restarted {
                restarted = true;
                continue;
            }
        }
        return backup_best;
    }
}
