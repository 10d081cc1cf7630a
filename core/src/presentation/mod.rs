// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Presentation Layer
//!
//! HTTP surface of the lead platform.
//!
//! # Architecture
//!
//! - **Layer:** Presentation
//! - **Purpose:** Translate HTTP requests into application service calls

pub mod api;
pub mod client_ip;
