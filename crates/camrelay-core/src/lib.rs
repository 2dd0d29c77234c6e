//! # camrelay-core
//!
//! Core crate for camrelay. Contains configuration schemas, typed
//! identifiers (connection ids and session codes), the peer role enum,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other camrelay crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
