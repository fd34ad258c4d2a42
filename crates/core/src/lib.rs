//! Tradepost Core - Shared domain types.
//!
//! This crate provides common types used across all Tradepost components:
//! - `api` - REST API, checkout workflow, and admin alert socket
//! - `cli` - Command-line tools for migrations and admin management
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, money, statuses, and query helpers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
