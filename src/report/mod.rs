// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! Wire-record assembly: stack frame shapes, signal naming, fingerprinting
//! and the exception envelope builder.

mod builder;
mod fingerprint;
mod sig_info;
mod stacktrace;

pub use builder::*;
pub use fingerprint::*;
pub use sig_info::*;
pub use stacktrace::*;
