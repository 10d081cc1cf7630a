// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects and the persistence/transport contracts the
//! application layer is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Pure business types, no I/O

pub mod attribution;
pub mod cache;
pub mod config;
pub mod contact;
pub mod delivery;
pub mod form;
pub mod lead;
pub mod repository;
pub mod site;
