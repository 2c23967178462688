//! Engine Configuration Module
//!
//! Provides the engine configuration loaded from TOML files, with every
//! tunable of the embedding client, store, scorer and ingestion pipeline
//! exposed as an operator-editable value.
//!
//! ## Loading Order
//!
//! 1. `SAFETY_RAG_CONFIG` environment variable (path to TOML file)
//! 2. `rag_config.toml` in the current working directory
//! 3. Built-in defaults (see `defaults.rs`)
//!
//! The loaded `RagConfig` is an explicit value: the binary loads it once and
//! hands it to the components that need it.

mod rag_config;
pub mod defaults;
pub mod validation;

pub use rag_config::*;
