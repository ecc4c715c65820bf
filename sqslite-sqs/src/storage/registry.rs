//! Registry of named queues

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::attributes::{CreateQueueOptions, DEFAULT_VISIBILITY_TIMEOUT};
use super::clock::{Clock, SystemClock};
use super::queue::Queue;
use super::receipt::ReceiptHandleGenerator;
use crate::error::SqsError;

const MAX_QUEUE_NAME_LENGTH: usize = 80;

/// Settings shared by every queue in a registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL queue URLs are built from
    pub endpoint_url: String,
    pub account_id: String,
    pub region: String,
    /// Visibility timeout for queues created without one
    pub default_visibility_timeout: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:4566".to_string(),
            account_id: "000000000000".to_string(),
            region: "us-east-1".to_string(),
            default_visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct Entry {
    /// Creation order, for unfiltered listing
    ordinal: u64,
    queue: Arc<Queue>,
}

/// Owns every queue, keyed by name.
///
/// The map is only locked for the lookup or structural change itself; queue
/// operations run on a cloned `Arc<Queue>` after the map guard is released.
#[derive(Debug)]
pub struct QueueRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    receipts: Arc<ReceiptHandleGenerator>,
    queues: DashMap<String, Entry>,
    next_ordinal: AtomicU64,
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl QueueRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            receipts: Arc::new(ReceiptHandleGenerator::new()),
            queues: DashMap::new(),
            next_ordinal: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn queue_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint_url.trim_end_matches('/'),
            self.config.account_id,
            name
        )
    }

    pub fn queue_arn(&self, name: &str) -> String {
        format!(
            "arn:aws:sqs:{}:{}:{}",
            self.config.region, self.config.account_id, name
        )
    }

    /// Create a queue, or return the existing one of the same name unchanged
    pub fn create_queue(
        &self,
        name: &str,
        options: &CreateQueueOptions,
    ) -> Result<Arc<Queue>, SqsError> {
        validate_queue_name(name)?;
        let settings = options.settings(self.config.default_visibility_timeout)?;

        let mut created = false;
        let entry = self.queues.entry(name.to_string()).or_insert_with(|| {
            created = true;
            Entry {
                ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
                queue: Arc::new(Queue::new(
                    name.to_string(),
                    self.queue_url(name),
                    self.queue_arn(name),
                    settings,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.receipts),
                )),
            }
        });
        let queue = Arc::clone(&entry.queue);
        drop(entry);

        if created {
            info!(name = %name, url = %queue.url(), "Created queue");
        } else {
            info!(name = %name, "Queue already exists");
        }
        Ok(queue)
    }

    /// Remove a queue and its messages; absent queues are ignored
    pub fn delete_queue(&self, name: &str) {
        if self.queues.remove(name).is_some() {
            info!(name = %name, "Deleted queue");
        }
    }

    /// Queues whose name starts with `prefix`, in creation order
    pub fn list_queues(&self, prefix: Option<&str>) -> Vec<Arc<Queue>> {
        let mut matching: Vec<(u64, Arc<Queue>)> = self
            .queues
            .iter()
            .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
            .map(|entry| (entry.ordinal, Arc::clone(&entry.queue)))
            .collect();
        matching.sort_by_key(|(ordinal, _)| *ordinal);
        matching.into_iter().map(|(_, queue)| queue).collect()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<Queue>, SqsError> {
        self.queues
            .get(name)
            .map(|entry| Arc::clone(&entry.queue))
            .ok_or_else(|| SqsError::QueueNotFound(name.to_string()))
    }

    /// Resolve a queue URL by its final path segment
    pub fn resolve_url(&self, url: &str) -> Result<Arc<Queue>, SqsError> {
        self.resolve(queue_name_from_url(url))
    }

    pub fn get_queue_url(&self, name: &str) -> Result<String, SqsError> {
        self.resolve(name).map(|queue| queue.url().to_string())
    }
}

/// Last non-empty path segment of a queue URL; a bare name is returned as is
pub fn queue_name_from_url(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn validate_queue_name(name: &str) -> Result<(), SqsError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_QUEUE_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(SqsError::InvalidParameter(format!(
            "Queue name must be 1-{} alphanumeric, hyphen or underscore characters: {:?}",
            MAX_QUEUE_NAME_LENGTH, name
        )))
    }
}
