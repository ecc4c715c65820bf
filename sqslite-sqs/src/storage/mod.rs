//! SQS in-memory storage
//!
//! Visibility timeouts are evaluated lazily: a message is hidden while its
//! `visible_at` lies in the future according to the queue's clock, and no
//! timer ever fires to bring it back.

mod attributes;
mod clock;
mod message;
mod queue;
mod receipt;
mod registry;


pub use attributes::{
    visibility_timeout, CreateQueueOptions, QueueAttributeName, QueueSettings, SettingChange,
    DEFAULT_MAXIMUM_MESSAGE_SIZE, DEFAULT_VISIBILITY_TIMEOUT, MAX_VISIBILITY_TIMEOUT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use message::{Message, MessageAttributeName, MessageState};
pub use queue::{MessageCounts, Queue, ReceivedMessage, SentMessage};
pub use receipt::{ReceiptHandle, ReceiptHandleGenerator};
pub use registry::{queue_name_from_url, QueueRegistry, RegistryConfig};
