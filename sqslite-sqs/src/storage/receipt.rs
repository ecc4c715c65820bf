//! Receipt handles: per-delivery capability tokens

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::SqsError;

/// Token authorising delete and change-visibility for one delivery of a message.
///
/// A new handle is issued on every receive; handles are only ever compared for
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Validate the shape of a handle supplied by a caller.
    ///
    /// A handle that parses may still be stale; that is decided by the queue.
    pub fn parse(text: &str) -> Result<Self, SqsError> {
        let invalid = || SqsError::InvalidReceiptHandle(text.to_string());

        let decoded = URL_SAFE_NO_PAD.decode(text).map_err(|_| invalid())?;
        let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

        let fields: Vec<&str> = decoded.splitn(4, ':').collect();
        match fields.as_slice() {
            [queue, message_id, serial, nonce]
                if !queue.is_empty()
                    && !message_id.is_empty()
                    && serial.parse::<u64>().is_ok()
                    && !nonce.is_empty() =>
            {
                Ok(Self(text.to_string()))
            }
            _ => Err(invalid()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues receipt handles that are unique for the lifetime of the process
#[derive(Debug, Default)]
pub struct ReceiptHandleGenerator {
    issued: AtomicU64,
}

impl ReceiptHandleGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, queue: &str, message_id: &str) -> ReceiptHandle {
        let serial = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = format!("{}:{}:{}:{}", queue, message_id, serial, Uuid::new_v4().simple());
        ReceiptHandle(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Number of handles issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_handles_are_unique_per_delivery() {
        let generator = ReceiptHandleGenerator::new();
        let first = generator.next("orders", "msg-1");
        let second = generator.next("orders", "msg-1");

        assert_ne!(first, second);
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_handles_unique_across_threads() {
        let generator = ReceiptHandleGenerator::new();
        let handles: Vec<ReceiptHandle> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| s.spawn(|| (0..250).map(|_| generator.next("q", "m")).collect::<Vec<_>>()))
                .collect();
            workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
        });

        let unique: HashSet<_> = handles.iter().collect();
        assert_eq!(unique.len(), 1000);
    }

    #[test]
    fn test_generated_handle_parses() {
        let generator = ReceiptHandleGenerator::new();
        let handle = generator.next("orders", "9b1c0e6e-0000-4000-8000-000000000000");

        let parsed = ReceiptHandle::parse(handle.as_str()).unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn test_malformed_handles_rejected() {
        for text in ["", "not base64 at all!", "Zm9v", "YTpiOmM6ZA"] {
            let result = ReceiptHandle::parse(text);
            assert!(
                matches!(result, Err(SqsError::InvalidReceiptHandle(_))),
                "accepted {:?}",
                text
            );
        }
    }
}
