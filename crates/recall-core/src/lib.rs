// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Recall memory engine.
//!
//! This crate provides the trait definitions, error type, and common types
//! shared by the memory engine and the adapters that back it. The engine
//! consumes two black-box capabilities through these traits: an embedding
//! function and an LLM completion service.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RecallError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
