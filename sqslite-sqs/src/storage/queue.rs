//! A single queue and its message lifecycle

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::attributes::{self, QueueAttributeName, QueueSettings};
use super::clock::Clock;
use super::message::{Message, MessageAttributeName, MessageState};
use super::receipt::{ReceiptHandle, ReceiptHandleGenerator};
use crate::error::SqsError;

/// Result of a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub md5_of_body: String,
}

/// A message handed out by a receive
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    pub md5_of_body: String,
    pub receipt_handle: ReceiptHandle,
    /// System attributes as they stood before this delivery was recorded
    pub attributes: BTreeMap<MessageAttributeName, String>,
}

/// Point-in-time message counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    pub available: usize,
    pub in_flight: usize,
}

/// State guarded by the queue lock
#[derive(Debug)]
struct QueueInner {
    settings: QueueSettings,
    last_modified: DateTime<Utc>,
    /// Messages keyed by enqueue sequence
    messages: BTreeMap<u64, Message>,
    /// Receipt handle of each delivery -> message sequence
    deliveries: HashMap<ReceiptHandle, u64>,
    next_sequence: u64,
}

impl QueueInner {
    fn counts(&self, now: DateTime<Utc>) -> MessageCounts {
        let mut counts = MessageCounts::default();
        for message in self.messages.values() {
            match message.state(now) {
                MessageState::Available => counts.available += 1,
                MessageState::InFlight => counts.in_flight += 1,
            }
        }
        counts
    }

    /// Sequence of the in-flight message `handle` currently authorises
    fn current_delivery(&self, handle: &ReceiptHandle, now: DateTime<Utc>) -> Option<u64> {
        let sequence = *self.deliveries.get(handle)?;
        self.messages
            .get(&sequence)
            .filter(|message| message.is_current_delivery(handle, now))
            .map(|_| sequence)
    }
}

/// A named queue.
///
/// All message state transitions happen under the queue's own lock, so
/// operations on different queues never contend.
#[derive(Debug)]
pub struct Queue {
    name: String,
    url: String,
    arn: String,
    created_timestamp: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    receipts: Arc<ReceiptHandleGenerator>,
    inner: Mutex<QueueInner>,
}

impl Queue {
    pub fn new(
        name: String,
        url: String,
        arn: String,
        settings: QueueSettings,
        clock: Arc<dyn Clock>,
        receipts: Arc<ReceiptHandleGenerator>,
    ) -> Self {
        let now = clock.now();
        Self {
            name,
            url,
            arn,
            created_timestamp: now,
            clock,
            receipts,
            inner: Mutex::new(QueueInner {
                settings,
                last_modified: now,
                messages: BTreeMap::new(),
                deliveries: HashMap::new(),
                next_sequence: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }

    pub fn created_timestamp(&self) -> DateTime<Utc> {
        self.created_timestamp
    }

    pub fn last_modified_timestamp(&self) -> DateTime<Utc> {
        self.inner.lock().last_modified
    }

    pub fn settings(&self) -> QueueSettings {
        self.inner.lock().settings
    }

    pub fn counts(&self) -> MessageCounts {
        let now = self.clock.now();
        self.inner.lock().counts(now)
    }

    /// Enqueue a message in the Available state
    pub fn send_message(&self, body: String) -> Result<SentMessage, SqsError> {
        if body.is_empty() {
            return Err(SqsError::InvalidParameter(
                "Message body must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let limit = inner.settings.maximum_message_size as usize;
        if body.len() > limit {
            return Err(SqsError::InvalidParameter(format!(
                "Message body must be shorter than {} bytes",
                limit
            )));
        }

        inner.next_sequence += 1;
        let sequence = inner.next_sequence;
        let message = Message::new(body, now, sequence);
        let sent = SentMessage {
            message_id: message.id.clone(),
            md5_of_body: message.md5_of_body.clone(),
        };
        inner.messages.insert(sequence, message);

        info!(queue = %self.name, message_id = %sent.message_id, "Sent message");
        Ok(sent)
    }

    /// Claim one available message, hiding it for the visibility timeout.
    ///
    /// `visibility_timeout` overrides the queue default for this delivery.
    /// Returns `None` when nothing is available.
    pub fn receive_message(
        &self,
        visibility_timeout: Option<i64>,
    ) -> Result<Option<ReceivedMessage>, SqsError> {
        Ok(self.receive_messages(1, visibility_timeout)?.pop())
    }

    /// Claim up to `max` distinct available messages in one atomic step
    pub fn receive_messages(
        &self,
        max: usize,
        visibility_timeout: Option<i64>,
    ) -> Result<Vec<ReceivedMessage>, SqsError> {
        let override_timeout = visibility_timeout
            .map(attributes::visibility_timeout)
            .transpose()?;
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // Oldest send first, enqueue order on ties
        let mut candidates: Vec<(DateTime<Utc>, u64)> = inner
            .messages
            .values()
            .filter(|message| message.is_available(now))
            .map(|message| (message.sent_timestamp, message.sequence))
            .collect();
        if candidates.is_empty() {
            debug!(queue = %self.name, "No message available");
            return Ok(Vec::new());
        }
        if candidates.len() > max {
            candidates.select_nth_unstable(max - 1);
            candidates.truncate(max);
        }
        candidates.sort_unstable();

        let timeout = override_timeout.unwrap_or(inner.settings.visibility_timeout);
        let hidden_for = Duration::seconds(i64::from(timeout));
        let mut received = Vec::with_capacity(candidates.len());

        for (_, sequence) in candidates {
            let Some(message) = inner.messages.get_mut(&sequence) else {
                continue;
            };

            let handle = self.receipts.next(&self.name, &message.id);
            let attributes = message.attributes();
            if let Some(stale) = message.deliver(now, hidden_for, handle.clone()) {
                inner.deliveries.remove(&stale);
            }
            inner.deliveries.insert(handle.clone(), sequence);

            info!(
                queue = %self.name,
                message_id = %message.id,
                receive_count = message.receive_count,
                visibility_timeout = timeout,
                "Received message"
            );

            received.push(ReceivedMessage {
                message_id: message.id.clone(),
                body: message.body.clone(),
                md5_of_body: message.md5_of_body.clone(),
                receipt_handle: handle,
                attributes,
            });
        }

        Ok(received)
    }

    /// Delete the message whose current delivery `receipt_handle` authorises.
    ///
    /// A stale handle is accepted and ignored.
    pub fn delete_message(&self, receipt_handle: &str) -> Result<(), SqsError> {
        let handle = ReceiptHandle::parse(receipt_handle)?;

        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let Some(sequence) = inner.current_delivery(&handle, now) else {
            debug!(queue = %self.name, "Ignoring delete with stale receipt handle");
            return Ok(());
        };

        inner.deliveries.remove(&handle);
        if let Some(message) = inner.messages.remove(&sequence) {
            info!(queue = %self.name, message_id = %message.id, "Deleted message");
        }
        Ok(())
    }

    /// Reset the visibility of an in-flight delivery to `timeout` seconds from now.
    ///
    /// Zero makes the message available immediately. A stale handle is
    /// accepted and ignored.
    pub fn change_message_visibility(
        &self,
        receipt_handle: &str,
        timeout: i64,
    ) -> Result<(), SqsError> {
        let handle = ReceiptHandle::parse(receipt_handle)?;
        let timeout = attributes::visibility_timeout(timeout)?;

        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let Some(sequence) = inner.current_delivery(&handle, now) else {
            debug!(queue = %self.name, "Ignoring visibility change with stale receipt handle");
            return Ok(());
        };

        if let Some(message) = inner.messages.get_mut(&sequence) {
            message.set_visibility(now, Duration::seconds(i64::from(timeout)));
            info!(
                queue = %self.name,
                message_id = %message.id,
                visibility_timeout = timeout,
                "Changed message visibility"
            );
        }
        Ok(())
    }

    /// Compute the requested attributes as wire strings
    pub fn get_attributes(
        &self,
        names: &[QueueAttributeName],
    ) -> BTreeMap<QueueAttributeName, String> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let counts = inner.counts(now);

        QueueAttributeName::expand(names)
            .into_iter()
            .map(|name| {
                let value = match name {
                    QueueAttributeName::VisibilityTimeout => {
                        inner.settings.visibility_timeout.to_string()
                    }
                    QueueAttributeName::MaximumMessageSize => {
                        inner.settings.maximum_message_size.to_string()
                    }
                    QueueAttributeName::ApproximateNumberOfMessages => counts.available.to_string(),
                    QueueAttributeName::ApproximateNumberOfMessagesNotVisible => {
                        counts.in_flight.to_string()
                    }
                    QueueAttributeName::CreatedTimestamp => {
                        self.created_timestamp.timestamp().to_string()
                    }
                    QueueAttributeName::LastModifiedTimestamp => {
                        inner.last_modified.timestamp().to_string()
                    }
                    QueueAttributeName::QueueArn => self.arn.clone(),
                    // expand() never yields the selector
                    QueueAttributeName::All => String::new(),
                };
                (name, value)
            })
            .collect()
    }

    /// Apply attribute changes; all entries are validated before any is applied
    pub fn set_attributes(&self, attributes: &HashMap<String, String>) -> Result<(), SqsError> {
        let changes = QueueSettings::parse_changes(attributes)?;

        if changes.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut inner = self.inner.lock();
        for change in changes {
            inner.settings.apply(change);
        }
        inner.last_modified = now;

        info!(queue = %self.name, settings = ?inner.settings, "Updated queue attributes");
        Ok(())
    }

    /// Drop every message and invalidate every outstanding receipt handle
    pub fn purge(&self) {
        let mut inner = self.inner.lock();
        let purged = inner.messages.len();
        inner.messages.clear();
        inner.deliveries.clear();

        info!(queue = %self.name, purged, "Purged queue");
    }
}
