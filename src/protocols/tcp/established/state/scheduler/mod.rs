// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The multipath send scheduler: given a connection's set of subflows
//! and queued segments, decides which subflow carries what next.

mod availability;
mod chrono;
mod default_sched;
mod meta;
mod next_segment;
mod rcv_buf;
mod registry;
mod scratch;
mod segment;
mod select;
mod subflow;

pub use availability::{available, def_unavailable, dont_reinject, temp_unavailable};
pub use chrono::{Chrono, ChronoKind};
pub use default_sched::{DefaultScheduler, DEFAULT_SCHED_NAME};
pub use meta::MetaConnection;
pub use next_segment::{next_segment, NextSegment, ReinjectTag};
pub use rcv_buf::rcv_buf_opt;
pub use registry::{AdminCapability, Registry, SchedulerEntry, SchedulerOps};
pub use scratch::{SchedScratch, SCHED_MAX_PRIV};
pub use segment::Segment;
pub use select::{get_available_subflow, pick};
pub use subflow::{CaState, Subflow};
