// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod established;
mod seq_number;

pub use seq_number::SeqNumber;
