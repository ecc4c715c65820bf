//! Core types for sqslite
//!
//! Protocol-agnostic AWS plumbing shared by the queue service and the server
//! binary: error codes with their wire renderings, and request IDs.

pub mod error;
pub mod request_id;

pub use error::{AwsError, ErrorCode, Fault};
pub use request_id::RequestId;
