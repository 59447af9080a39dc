//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate closing flows into use-case level APIs.
//! - Keep callers (CLI, API envelopes) decoupled from storage details.

pub mod closing_service;
pub mod record_service;
