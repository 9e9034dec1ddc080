//! # REVERIE Core Library
//!
//! Cognitive memory and social-relationship engine for autonomous
//! simulated characters.
//!
//! Every character owns a [`memory::MemoryIndex`] of timestamped,
//! importance-rated memories with composite retrieval (relevance +
//! recency + importance), linear importance decay with pruning, and
//! similarity-clustered consolidation that bounds storage while
//! preserving the gist. Accumulated experience periodically triggers a
//! [`reflection::ReflectionEngine`] pass that distills raw memories into
//! first-person insights. Pairwise social state lives in a concurrent
//! [`social::SocialGraph`] with sentiment-driven strength updates,
//! staleness-safe event ordering, and graph queries (mutual
//! acquaintances, shortest social path, friend clusters).
//!
//! External model calls go through the [`provider`] traits; the
//! HTTP-backed implementations live in the `reverie-llm` crate, and every
//! call site degrades gracefully when a provider fails. State persists to
//! SQLite through [`persistence::PersistenceEngine`].

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod provider;
pub mod reflection;
pub mod registry;
pub mod social;
pub mod types;

pub use config::EngineConfig;
pub use error::{EngineError, ProviderError, Result};
pub use memory::{MemoryIndex, MemoryRecord, RetrievedMemory};
pub use persistence::PersistenceEngine;
pub use provider::{EmbeddingProvider, LanguageModel};
pub use reflection::ReflectionEngine;
pub use registry::MemoryRegistry;
pub use social::{RelationType, Relationship, SocialGraph};
pub use types::*;
