// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! SUM Core
//!
//! Lead capture, spam protection, signed webhook delivery and versioned
//! caching for SUM client sites.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Hosts every bounded context of the lead platform

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
