//! Core protocol types for httpdemux.
//!
//! This crate provides the values exchanged between an HTTP wire codec and
//! the response layer (`httpdemux`).
//!
//! ## Modules
//!
//! - [`object`]: Decoded header, body and trailer events
//! - [`error`]: The response error taxonomy

pub mod error;
pub mod object;

pub use error::*;
pub use object::*;
