// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Per-subflow scheduler scratch space.
//!
//! The original keeps a fixed `MPTCP_SCHED_SIZE`-byte region inline in the
//! subflow's control block and lets each scheduler reinterpret it as its
//! own `struct foo_priv`. A byte-for-byte port of that would mean casting
//! raw bytes to a `repr(C)` struct, which Rust has better tools for: each
//! scheduler owns a small `Any`-backed type and the subflow just stores
//! `Option<Box<dyn SchedScratch>>`, installed by that scheduler's `init`.

use std::any::Any;

/// Marker for a scheduler's private per-subflow state. There is no
/// fixed-size backing buffer to overflow in this design, but a
/// scheduler still declares a `priv_size` at registration time
/// (`SchedulerOps::priv_size`), and `Registry::register` rejects one
/// that exceeds `SCHED_MAX_PRIV` (spec.md §4.5).
pub trait SchedScratch: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> SchedScratch for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Upper bound on a scheduler's declared `priv_size`, enforced by
/// `Registry::register` (spec.md §4.5).
pub const SCHED_MAX_PRIV: usize = 128;
