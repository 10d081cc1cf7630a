// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache_versioning;
pub mod delivery;
pub mod form_definition_service;
pub mod lead_service;
pub mod notifications;
pub mod repository_factory;
pub mod spam;
pub mod submission;
pub mod webhook;

// Re-export use cases for convenience
pub use cache_versioning::{VersionedCache, ViewCache};
pub use delivery::{DeliveryOutcome, DeliveryService, DeliverySettings};
pub use form_definition_service::{FormDefinitionError, FormDefinitionService};
pub use lead_service::{LeadError, LeadService, NewLead, PostCreateHook, StandardLeadService};
pub use spam::{SpamGuard, SpamVerdict, TimeTokenSigner};
pub use submission::{FormSubmissionService, SubmissionAccepted, SubmissionError, SubmissionRequest};
