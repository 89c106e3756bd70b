//! Core types shared across the DNP3 link stack
//!
//! This crate holds the error type and the session configuration used by
//! both the transport crate and the link layer itself.

pub mod config;
pub mod error;

pub use config::LinkConfig;
pub use error::{LinkError, LinkResult};
