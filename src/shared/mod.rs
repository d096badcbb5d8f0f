// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! Constants and configuration shared between the collector and the transport.

pub mod configuration;
pub mod constants;
