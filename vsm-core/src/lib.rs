//! Core types for VSM
//!
//! This crate provides the error codes and request identifiers shared by the
//! secret manager and the server binary.

pub mod error;
pub mod request_id;

pub use error::{ApiError, ErrorCode};
pub use request_id::{RequestId, REQUEST_ID_HEADER};
