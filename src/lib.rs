// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! A multipath send scheduler: given a connection's set of subflows and
//! its queued segments, decides which subflow should carry what next.
//!
//! The pluggable-scheduler shape (a registry of named implementations,
//! one of them a process-wide default, each handed a connection's
//! subflow/queue state and asked "what next") follows MPTCP's
//! `mptcp_sched_ops`. Congestion control, retransmission timers, and
//! everything else that decides *when* a byte becomes eligible to send
//! are out of scope here — this crate only answers "given an eligible
//! byte, which subflow, how many of them".

pub mod fail;
pub mod protocols;
pub mod runtime;

pub use fail::Fail;
pub use protocols::tcp::established::state::scheduler;
pub use protocols::tcp::SeqNumber;
