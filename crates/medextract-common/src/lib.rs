//! medextract common library
//!
//! Shared utilities for the medextract workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the common error type and result alias
//! - **Digests**: one-way identifier hashing used for pseudonymized paths
//! - **Logging**: tracing subscriber bootstrap (console, rolling file, JSON)
//!
//! # Example
//!
//! ```no_run
//! use medextract_common::digest::sha224_hex;
//!
//! let dir_name = sha224_hex("PATIENT-0001");
//! assert_eq!(dir_name.len(), 56);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod digest;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
