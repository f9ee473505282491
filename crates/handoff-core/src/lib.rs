//! Handoff Core - Shared configuration and error types
//!
//! This crate provides the foundational types used across all Handoff components.

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
