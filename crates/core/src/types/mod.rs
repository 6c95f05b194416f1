//! Core types for Emporium.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod page;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money, round_money};
pub use page::{Page, PageRequest};
pub use status::*;
