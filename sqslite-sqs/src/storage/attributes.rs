//! Queue attribute catalogue and validation

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::SqsError;

pub const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;
pub const MAX_VISIBILITY_TIMEOUT: u32 = 43_200; // 12 hours
pub const DEFAULT_MAXIMUM_MESSAGE_SIZE: u32 = 262_144; // 256KB
pub const MIN_MAXIMUM_MESSAGE_SIZE: u32 = 1_024;

/// Queue attributes understood by Get/SetQueueAttributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueAttributeName {
    All,
    VisibilityTimeout,
    MaximumMessageSize,
    ApproximateNumberOfMessages,
    ApproximateNumberOfMessagesNotVisible,
    CreatedTimestamp,
    LastModifiedTimestamp,
    QueueArn,
}

impl QueueAttributeName {
    /// Every concrete attribute, i.e. what `All` expands to
    pub const ALL: [QueueAttributeName; 7] = [
        Self::VisibilityTimeout,
        Self::MaximumMessageSize,
        Self::ApproximateNumberOfMessages,
        Self::ApproximateNumberOfMessagesNotVisible,
        Self::CreatedTimestamp,
        Self::LastModifiedTimestamp,
        Self::QueueArn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::VisibilityTimeout => "VisibilityTimeout",
            Self::MaximumMessageSize => "MaximumMessageSize",
            Self::ApproximateNumberOfMessages => "ApproximateNumberOfMessages",
            Self::ApproximateNumberOfMessagesNotVisible => "ApproximateNumberOfMessagesNotVisible",
            Self::CreatedTimestamp => "CreatedTimestamp",
            Self::LastModifiedTimestamp => "LastModifiedTimestamp",
            Self::QueueArn => "QueueArn",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Self::VisibilityTimeout | Self::MaximumMessageSize)
    }

    /// Expand a selection, replacing `All` with every attribute and dropping duplicates
    pub fn expand(names: &[QueueAttributeName]) -> Vec<QueueAttributeName> {
        if names.contains(&Self::All) {
            return Self::ALL.to_vec();
        }
        let mut expanded = names.to_vec();
        expanded.sort();
        expanded.dedup();
        expanded
    }
}

impl FromStr for QueueAttributeName {
    type Err = SqsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" => Ok(Self::All),
            "VisibilityTimeout" => Ok(Self::VisibilityTimeout),
            "MaximumMessageSize" => Ok(Self::MaximumMessageSize),
            "ApproximateNumberOfMessages" => Ok(Self::ApproximateNumberOfMessages),
            "ApproximateNumberOfMessagesNotVisible" => {
                Ok(Self::ApproximateNumberOfMessagesNotVisible)
            }
            "CreatedTimestamp" => Ok(Self::CreatedTimestamp),
            "LastModifiedTimestamp" => Ok(Self::LastModifiedTimestamp),
            "QueueArn" => Ok(Self::QueueArn),
            other => Err(SqsError::InvalidAttributeName(other.to_string())),
        }
    }
}

impl fmt::Display for QueueAttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub visibility_timeout: u32,
    pub maximum_message_size: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            maximum_message_size: DEFAULT_MAXIMUM_MESSAGE_SIZE,
        }
    }
}

impl QueueSettings {
    /// Validate a wire attribute map into a list of setting changes.
    ///
    /// Nothing is applied here, so a rejected map leaves the queue untouched.
    pub fn parse_changes(
        attributes: &HashMap<String, String>,
    ) -> Result<Vec<SettingChange>, SqsError> {
        let mut changes = Vec::with_capacity(attributes.len());
        for (name, value) in attributes {
            let attribute: QueueAttributeName = name.parse()?;
            let change = match attribute {
                QueueAttributeName::VisibilityTimeout => SettingChange::VisibilityTimeout(
                    attribute_value(name, value, visibility_timeout)?,
                ),
                QueueAttributeName::MaximumMessageSize => SettingChange::MaximumMessageSize(
                    attribute_value(name, value, maximum_message_size)?,
                ),
                read_only => {
                    return Err(SqsError::InvalidAttributeValue(format!(
                        "Attribute {} is read-only",
                        read_only
                    )));
                }
            };
            changes.push(change);
        }
        Ok(changes)
    }

    pub fn apply(&mut self, change: SettingChange) {
        match change {
            SettingChange::VisibilityTimeout(v) => self.visibility_timeout = v,
            SettingChange::MaximumMessageSize(v) => self.maximum_message_size = v,
        }
    }
}

/// A validated change to a queue setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    VisibilityTimeout(u32),
    MaximumMessageSize(u32),
}

/// Options accepted by CreateQueue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateQueueOptions {
    pub visibility_timeout: Option<i64>,
    pub maximum_message_size: Option<i64>,
}

impl CreateQueueOptions {
    pub fn with_visibility_timeout(seconds: i64) -> Self {
        Self {
            visibility_timeout: Some(seconds),
            ..Self::default()
        }
    }

    /// Build options from a CreateQueue `Attributes` map
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Result<Self, SqsError> {
        let mut options = Self::default();
        for (name, value) in attributes {
            match name.parse::<QueueAttributeName>()? {
                QueueAttributeName::VisibilityTimeout => {
                    let seconds = attribute_value(name, value, visibility_timeout)?;
                    options.visibility_timeout = Some(i64::from(seconds));
                }
                QueueAttributeName::MaximumMessageSize => {
                    let bytes = attribute_value(name, value, maximum_message_size)?;
                    options.maximum_message_size = Some(i64::from(bytes));
                }
                read_only => {
                    return Err(SqsError::InvalidAttributeValue(format!(
                        "Attribute {} cannot be set on create",
                        read_only
                    )));
                }
            }
        }
        Ok(options)
    }

    /// Resolve into concrete settings, falling back to `default_visibility_timeout`.
    ///
    /// The fallback is held to the same range as an explicit timeout.
    pub fn settings(&self, default_visibility_timeout: u32) -> Result<QueueSettings, SqsError> {
        let timeout = self
            .visibility_timeout
            .unwrap_or_else(|| i64::from(default_visibility_timeout));
        Ok(QueueSettings {
            visibility_timeout: visibility_timeout(timeout)?,
            maximum_message_size: match self.maximum_message_size {
                Some(v) => maximum_message_size(v)?,
                None => DEFAULT_MAXIMUM_MESSAGE_SIZE,
            },
        })
    }
}

/// Validate a visibility timeout in seconds
pub fn visibility_timeout(seconds: i64) -> Result<u32, SqsError> {
    u32::try_from(seconds)
        .ok()
        .filter(|v| *v <= MAX_VISIBILITY_TIMEOUT)
        .ok_or_else(|| {
            SqsError::InvalidParameter(format!(
                "VisibilityTimeout must be between 0 and {}, got {}",
                MAX_VISIBILITY_TIMEOUT, seconds
            ))
        })
}

fn maximum_message_size(bytes: i64) -> Result<u32, SqsError> {
    u32::try_from(bytes)
        .ok()
        .filter(|v| (MIN_MAXIMUM_MESSAGE_SIZE..=DEFAULT_MAXIMUM_MESSAGE_SIZE).contains(v))
        .ok_or_else(|| {
            SqsError::InvalidParameter(format!(
                "MaximumMessageSize must be between {} and {}, got {}",
                MIN_MAXIMUM_MESSAGE_SIZE, DEFAULT_MAXIMUM_MESSAGE_SIZE, bytes
            ))
        })
}

/// Parse and range-check an attribute from a wire map
fn attribute_value(
    name: &str,
    value: &str,
    validate: fn(i64) -> Result<u32, SqsError>,
) -> Result<u32, SqsError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|parsed| validate(parsed).ok())
        .ok_or_else(|| {
            SqsError::InvalidAttributeValue(format!("Invalid value for {}: {}", name, value))
        })
}
