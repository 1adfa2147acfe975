//! # FinOps Common Library
//!
//! Shared code for the FinOps assistant services including:
//! - Database initialization and schema
//! - Event types (FinopsEvent enum) and broadcast bus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
