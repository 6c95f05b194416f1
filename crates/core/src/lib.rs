//! Emporium Core - Shared domain types.
//!
//! This crate provides common types used across all Emporium components:
//! - `api` - The JSON commerce API server
//! - `cli` - Command-line tools for migrations, seeding and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, statuses
//!   and pagination

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
