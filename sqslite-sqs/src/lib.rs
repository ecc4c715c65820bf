//! In-memory SQS queue engine for sqslite
//!
//! The [`storage`] module holds the queue store: named queues, each with its
//! own lock, whose messages move between available and in flight as they are
//! received, released by timeout, or deleted. The [`handlers`] module exposes
//! it over the SQS JSON and query wire protocols.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod storage;

pub use error::SqsError;
pub use handlers::handle_request;
pub use storage::{CreateQueueOptions, Queue, QueueRegistry, RegistryConfig};
