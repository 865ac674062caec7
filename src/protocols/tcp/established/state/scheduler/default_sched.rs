// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! `mptcp_sched_default`: the scheduler this crate ships out of the box,
//! wiring `select`/`rcv_buf`/`next_segment` up behind `SchedulerOps` so
//! the registry has something to register at startup.

use super::meta::MetaConnection;
use super::next_segment::{self, NextSegment};
use super::rcv_buf;
use super::registry::{AdminCapability, Registry, SchedulerOps};
use super::segment::Segment;
use super::select::get_available_subflow;
use super::subflow::Subflow;
use crate::runtime::SystemClock;
use std::{rc::Rc, time::Instant};

pub const DEFAULT_SCHED_NAME: &str = "default";

pub struct DefaultScheduler;

impl SchedulerOps for DefaultScheduler {
    fn name(&self) -> &str {
        DEFAULT_SCHED_NAME
    }

    fn get_subflow(
        &self,
        meta: &MetaConnection<SystemClock>,
        segment: Option<&Segment>,
        zero_wnd_test: bool,
    ) -> Option<Rc<Subflow>> {
        get_available_subflow(meta, segment, zero_wnd_test)
    }

    fn next_segment(&self, meta: &MetaConnection<SystemClock>) -> Option<NextSegment> {
        next_segment::next_segment(meta)
    }

    fn init(&self, subflow: &Subflow, now: Instant) {
        rcv_buf::init_subflow(subflow, now);
    }

    fn priv_size(&self) -> usize {
        std::mem::size_of::<rcv_buf::RbufOptScratch>()
    }
}

/// Registers the default scheduler and makes it the registry's only
/// (hence default) entry — the Rust-native stand-in for
/// `late_initcall(mptcp_scheduler_default)`.
pub fn install(registry: &Registry, cap: &AdminCapability) {
    if registry.find(DEFAULT_SCHED_NAME).is_some() {
        return;
    }
    let _ = registry.register(cap, Box::new(DefaultScheduler));
}
