// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Chrono markers — "which resource is currently limiting progress"
//! (spec.md §4.4, §6, GLOSSARY). Treated as opaque timer/state markers:
//! this crate only starts them, it never reads how long they have been
//! running.

use std::{cell::Cell, time::Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChronoKind {
    Busy,
    RwndLimited,
    SndbufLimited,
}

/// Starting one chrono implicitly stops whichever other chrono was
/// running (spec.md §4.4 step 6: "this will stop any other chronos").
#[derive(Default)]
pub struct Chrono {
    current: Cell<Option<(ChronoKind, Instant)>>,
}

impl Chrono {
    pub fn start(&self, kind: ChronoKind, now: Instant) {
        self.current.set(Some((kind, now)));
    }

    pub fn current(&self) -> Option<ChronoKind> {
        self.current.get().map(|(kind, _)| kind)
    }
}
