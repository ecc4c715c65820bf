//! AWS error types and formatting

use serde::Serialize;
use thiserror::Error;

/// XML namespace of the SQS query protocol
pub const SQS_XML_NAMESPACE: &str = "http://queue.amazonaws.com/doc/2012-11-05/";

/// Which side of the exchange caused the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Sender,
    Receiver,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sender => "Sender",
            Self::Receiver => "Receiver",
        }
    }
}

/// SQS error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    QueueDoesNotExist,
    InvalidParameterValue,
    InvalidAttributeName,
    InvalidAttributeValue,
    ReceiptHandleIsInvalid,
    MissingParameter,
    InvalidAction,
    InternalFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueDoesNotExist => "QueueDoesNotExist",
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::InvalidAttributeName => "InvalidAttributeName",
            Self::InvalidAttributeValue => "InvalidAttributeValue",
            Self::ReceiptHandleIsInvalid => "ReceiptHandleIsInvalid",
            Self::MissingParameter => "MissingParameter",
            Self::InvalidAction => "InvalidAction",
            Self::InternalFailure => "InternalFailure",
        }
    }

    /// Code used by the query protocol and the `x-amzn-query-error` header.
    ///
    /// Only the missing-queue error kept its pre-JSON name.
    pub fn query_code(&self) -> &'static str {
        match self {
            Self::QueueDoesNotExist => "AWS.SimpleQueueService.NonExistentQueue",
            other => other.as_str(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::QueueDoesNotExist
            | Self::InvalidParameterValue
            | Self::InvalidAttributeName
            | Self::InvalidAttributeValue
            | Self::ReceiptHandleIsInvalid
            | Self::MissingParameter
            | Self::InvalidAction => 400,
            Self::InternalFailure => 500,
        }
    }

    pub fn fault(&self) -> Fault {
        match self {
            Self::InternalFailure => Fault::Receiver,
            _ => Fault::Sender,
        }
    }
}

/// AWS-style error
#[derive(Debug, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct AwsError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl AwsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Value of the `x-amzn-query-error` header sent alongside JSON errors
    pub fn query_error_header(&self) -> String {
        format!("{};{}", self.code.query_code(), self.code.fault().as_str())
    }

    /// Format as a query-protocol `ErrorResponse` document
    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ErrorResponse xmlns="{}">
  <Error>
    <Type>{}</Type>
    <Code>{}</Code>
    <Message>{}</Message>
    <Detail/>
  </Error>
  <RequestId>{}</RequestId>
</ErrorResponse>"#,
            SQS_XML_NAMESPACE,
            self.code.fault().as_str(),
            self.code.query_code(),
            escape_xml(&self.message),
            self.request_id
        )
    }

    /// Format as a JSON-protocol error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(rename = "__type")]
            error_type: String,
            message: &'a str,
        }

        let error = JsonError {
            error_type: format!("com.amazonaws.sqs#{}", self.code.as_str()),
            message: &self.message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"__type":"{}","message":""}}"#, self.code.as_str())
        })
    }
}

/// Escape text for inclusion in an XML element
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
