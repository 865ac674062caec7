// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Crate-wide error type.
//!
//! Mirrors the rest of the stack's convention of a single flat `Fail` enum
//! built with `custom_error!` rather than a per-module `thiserror` tree.
//! `NO_SUBFLOW` from the scheduler's error taxonomy is deliberately absent
//! here: an empty selection is an ordinary outcome (`Option::None`), not a
//! `Fail`.

custom_error::custom_error! {
    #[derive(Clone, PartialEq, Eq)]
    pub Fail

    Invalid{details: &'static str} = "invalid argument: {details}",
    Exists{name: String} = "'{name}' is already registered",
    NotFound{name: String} = "'{name}' could not be found",
    PermissionDenied{details: &'static str} = "permission denied: {details}",
    Malformed{details: &'static str} = "operation failed: {details}",
}
