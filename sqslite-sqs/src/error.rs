//! SQS error type

use sqslite_core::{AwsError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqsError {
    #[error("The specified queue does not exist: {0}")]
    QueueNotFound(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unknown attribute: {0}")]
    InvalidAttributeName(String),
    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),
    #[error("The receipt handle is not valid: {0}")]
    InvalidReceiptHandle(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl SqsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QueueNotFound(_) => ErrorCode::QueueDoesNotExist,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameterValue,
            Self::InvalidAttributeName(_) => ErrorCode::InvalidAttributeName,
            Self::InvalidAttributeValue(_) => ErrorCode::InvalidAttributeValue,
            Self::InvalidReceiptHandle(_) => ErrorCode::ReceiptHandleIsInvalid,
            Self::MissingParameter(_) => ErrorCode::MissingParameter,
            Self::UnknownOperation(_) => ErrorCode::InvalidAction,
        }
    }
}

impl From<SqsError> for AwsError {
    fn from(err: SqsError) -> Self {
        AwsError::new(err.code(), err.to_string())
    }
}
