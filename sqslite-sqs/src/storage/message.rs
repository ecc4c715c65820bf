//! Messages and their visibility state

use chrono::{DateTime, Duration, Utc};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::receipt::ReceiptHandle;

/// Where a message stands in its delivery lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Eligible for receive
    Available,
    /// Delivered and hidden until its visibility timeout elapses
    InFlight,
}

/// Per-message system attributes a receive can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageAttributeName {
    All,
    SentTimestamp,
    ApproximateReceiveCount,
    ApproximateFirstReceiveTimestamp,
}

impl MessageAttributeName {
    pub const ALL: [MessageAttributeName; 3] = [
        Self::SentTimestamp,
        Self::ApproximateReceiveCount,
        Self::ApproximateFirstReceiveTimestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::SentTimestamp => "SentTimestamp",
            Self::ApproximateReceiveCount => "ApproximateReceiveCount",
            Self::ApproximateFirstReceiveTimestamp => "ApproximateFirstReceiveTimestamp",
        }
    }
}

impl FromStr for MessageAttributeName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" => Ok(Self::All),
            "SentTimestamp" => Ok(Self::SentTimestamp),
            "ApproximateReceiveCount" => Ok(Self::ApproximateReceiveCount),
            "ApproximateFirstReceiveTimestamp" => Ok(Self::ApproximateFirstReceiveTimestamp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MessageAttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One enqueued item.
///
/// Only the owning queue mutates a message, and only while holding its lock.
#[derive(Debug, Clone)]
pub struct Message {
    pub(crate) id: String,
    pub(crate) body: String,
    pub(crate) md5_of_body: String,
    pub(crate) sent_timestamp: DateTime<Utc>,
    pub(crate) first_received_timestamp: Option<DateTime<Utc>>,
    pub(crate) receive_count: u32,
    pub(crate) visible_at: Option<DateTime<Utc>>,
    pub(crate) receipt_handle: Option<ReceiptHandle>,
    /// Enqueue order within the owning queue
    pub(crate) sequence: u64,
}

impl Message {
    pub(crate) fn new(body: String, sent_timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            md5_of_body: md5_hex(&body),
            body,
            sent_timestamp,
            first_received_timestamp: None,
            receive_count: 0,
            visible_at: None,
            receipt_handle: None,
            sequence,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn md5_of_body(&self) -> &str {
        &self.md5_of_body
    }

    pub fn receive_count(&self) -> u32 {
        self.receive_count
    }

    pub fn sent_timestamp(&self) -> DateTime<Utc> {
        self.sent_timestamp
    }

    pub fn first_received_timestamp(&self) -> Option<DateTime<Utc>> {
        self.first_received_timestamp
    }

    pub fn visible_at(&self) -> Option<DateTime<Utc>> {
        self.visible_at
    }

    pub fn state(&self, now: DateTime<Utc>) -> MessageState {
        match self.visible_at {
            Some(at) if at > now => MessageState::InFlight,
            _ => MessageState::Available,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == MessageState::Available
    }

    /// True if `handle` authorises the delivery currently in flight
    pub(crate) fn is_current_delivery(&self, handle: &ReceiptHandle, now: DateTime<Utc>) -> bool {
        self.state(now) == MessageState::InFlight && self.receipt_handle.as_ref() == Some(handle)
    }

    /// Record a delivery and return the handle it supersedes, if any
    pub(crate) fn deliver(
        &mut self,
        now: DateTime<Utc>,
        timeout: Duration,
        handle: ReceiptHandle,
    ) -> Option<ReceiptHandle> {
        self.receive_count += 1;
        self.first_received_timestamp.get_or_insert(now);
        self.visible_at = Some(now + timeout);
        self.receipt_handle.replace(handle)
    }

    pub(crate) fn set_visibility(&mut self, now: DateTime<Utc>, timeout: Duration) {
        self.visible_at = Some(now + timeout);
    }

    /// System attributes as wire strings; timestamps are epoch milliseconds
    pub fn attributes(&self) -> BTreeMap<MessageAttributeName, String> {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            MessageAttributeName::SentTimestamp,
            self.sent_timestamp.timestamp_millis().to_string(),
        );
        attributes.insert(
            MessageAttributeName::ApproximateReceiveCount,
            self.receive_count.to_string(),
        );
        attributes.insert(
            MessageAttributeName::ApproximateFirstReceiveTimestamp,
            self.first_received_timestamp
                .map_or(0, |at| at.timestamp_millis())
                .to_string(),
        );
        attributes
    }
}

pub(crate) fn md5_hex(body: &str) -> String {
    hex::encode(Md5::digest(body.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::receipt::ReceiptHandleGenerator;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_new_message_is_available() {
        let msg = Message::new("hello".to_string(), t0(), 1);
        assert_eq!(msg.state(t0()), MessageState::Available);
        assert_eq!(msg.receive_count(), 0);
        assert!(msg.first_received_timestamp().is_none());
        assert!(msg.visible_at().is_none());
    }

    #[test]
    fn test_md5_of_body() {
        let msg = Message::new("hello".to_string(), t0(), 1);
        assert_eq!(msg.md5_of_body(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_deliver_hides_until_timeout() {
        let handles = ReceiptHandleGenerator::new();
        let mut msg = Message::new("hello".to_string(), t0(), 1);

        let previous = msg.deliver(t0(), Duration::seconds(30), handles.next("q", msg.id()));
        assert!(previous.is_none());
        assert_eq!(msg.receive_count(), 1);
        assert_eq!(msg.first_received_timestamp(), Some(t0()));

        assert_eq!(msg.state(t0() + Duration::seconds(29)), MessageState::InFlight);
        assert_eq!(msg.state(t0() + Duration::seconds(30)), MessageState::Available);
    }

    #[test]
    fn test_redelivery_keeps_first_receive_and_returns_stale_handle() {
        let handles = ReceiptHandleGenerator::new();
        let mut msg = Message::new("hello".to_string(), t0(), 1);

        let first = handles.next("q", msg.id());
        msg.deliver(t0(), Duration::seconds(1), first.clone());

        let later = t0() + Duration::seconds(5);
        let second = handles.next("q", msg.id());
        let superseded = msg.deliver(later, Duration::seconds(1), second.clone());

        assert_eq!(superseded, Some(first.clone()));
        assert_eq!(msg.receive_count(), 2);
        assert_eq!(msg.first_received_timestamp(), Some(t0()));
        assert!(msg.is_current_delivery(&second, later));
        assert!(!msg.is_current_delivery(&first, later));
    }

    #[test]
    fn test_attributes_before_first_receive() {
        let msg = Message::new("hello".to_string(), t0(), 1);
        let attrs = msg.attributes();

        assert_eq!(attrs[&MessageAttributeName::ApproximateReceiveCount], "0");
        assert_eq!(attrs[&MessageAttributeName::ApproximateFirstReceiveTimestamp], "0");
        assert_eq!(
            attrs[&MessageAttributeName::SentTimestamp],
            t0().timestamp_millis().to_string()
        );
    }

    #[test]
    fn test_attribute_name_parsing() {
        assert_eq!("All".parse(), Ok(MessageAttributeName::All));
        assert_eq!(
            "ApproximateReceiveCount".parse(),
            Ok(MessageAttributeName::ApproximateReceiveCount)
        );
        assert!("SenderId".parse::<MessageAttributeName>().is_err());
    }
}
