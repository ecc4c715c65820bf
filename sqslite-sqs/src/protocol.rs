//! SQS wire protocols
//!
//! Requests arrive either as JSON with an `X-Amz-Target: AmazonSQS.<Action>`
//! header, or as query-protocol form parameters with an `Action` field. Both
//! are decoded into one [`SqsRequest`]; replies are rendered back in the
//! protocol the request came in.

use axum::http::HeaderMap;
use serde_json::{json, Map, Value};
use sqslite_core::error::{escape_xml, SQS_XML_NAMESPACE};
use std::collections::{BTreeMap, HashMap};

use crate::error::SqsError;
use crate::storage::{QueueAttributeName, ReceivedMessage, SentMessage};

pub const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
pub const XML_CONTENT_TYPE: &str = "text/xml";

const TARGET_HEADER: &str = "x-amz-target";
const TARGET_PREFIX: &str = "AmazonSQS.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Json,
    Query,
}

impl Protocol {
    pub fn detect(headers: &HeaderMap) -> Self {
        if headers.contains_key(TARGET_HEADER) {
            Self::Json
        } else {
            Self::Query
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => JSON_CONTENT_TYPE,
            Self::Query => XML_CONTENT_TYPE,
        }
    }
}

#[derive(Debug)]
enum Params {
    Json(Map<String, Value>),
    Query(HashMap<String, String>),
}

/// A decoded SQS request
#[derive(Debug)]
pub struct SqsRequest {
    pub protocol: Protocol,
    pub action: String,
    params: Params,
}

impl SqsRequest {
    /// Decode a request from its headers, URL query string and body
    pub fn parse(headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> Result<Self, SqsError> {
        match Protocol::detect(headers) {
            Protocol::Json => {
                let target = headers
                    .get(TARGET_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                let action = target.strip_prefix(TARGET_PREFIX).unwrap_or(target);

                let params = if body.iter().all(u8::is_ascii_whitespace) {
                    Map::new()
                } else {
                    match serde_json::from_slice::<Value>(body) {
                        Ok(Value::Object(map)) => map,
                        Ok(_) => {
                            return Err(SqsError::InvalidParameter(
                                "Request body must be a JSON object".to_string(),
                            ))
                        }
                        Err(e) => {
                            return Err(SqsError::InvalidParameter(format!(
                                "Malformed JSON body: {}",
                                e
                            )))
                        }
                    }
                };

                Ok(Self {
                    protocol: Protocol::Json,
                    action: action.to_string(),
                    params: Params::Json(params),
                })
            }
            Protocol::Query => {
                let mut params: HashMap<String, String> = HashMap::new();
                if let Some(query) = query {
                    params.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
                }
                params.extend(form_urlencoded::parse(body).into_owned());

                let action = params
                    .get("Action")
                    .cloned()
                    .ok_or_else(|| SqsError::MissingParameter("Action".to_string()))?;

                Ok(Self {
                    protocol: Protocol::Query,
                    action,
                    params: Params::Query(params),
                })
            }
        }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        match &self.params {
            Params::Json(map) => map.get(name).and_then(scalar_to_string),
            Params::Query(map) => map.get(name).cloned(),
        }
    }

    pub fn required(&self, name: &str) -> Result<String, SqsError> {
        self.string(name)
            .ok_or_else(|| SqsError::MissingParameter(name.to_string()))
    }

    pub fn integer(&self, name: &str) -> Result<Option<i64>, SqsError> {
        self.string(name)
            .map(|value| {
                value.trim().parse::<i64>().map_err(|_| {
                    SqsError::InvalidParameter(format!(
                        "Value {} for parameter {} is invalid",
                        value, name
                    ))
                })
            })
            .transpose()
    }

    /// The `Attributes` map (JSON) or `Attribute.N.Name`/`Attribute.N.Value` pairs (query)
    pub fn attribute_map(&self) -> HashMap<String, String> {
        match &self.params {
            Params::Json(map) => map
                .get("Attributes")
                .and_then(Value::as_object)
                .map(|attributes| {
                    attributes
                        .iter()
                        .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
                        .collect()
                })
                .unwrap_or_default(),
            Params::Query(map) => map
                .iter()
                .filter_map(|(key, name)| {
                    let index = key.strip_prefix("Attribute.")?.strip_suffix(".Name")?;
                    let value = map.get(&format!("Attribute.{}.Value", index))?;
                    Some((name.clone(), value.clone()))
                })
                .collect(),
        }
    }

    /// A string list: a JSON array under `json_key`, or `query_prefix.N` members
    pub fn list(&self, json_key: &str, query_prefix: &str) -> Vec<String> {
        match &self.params {
            Params::Json(map) => map
                .get(json_key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(scalar_to_string).collect())
                .unwrap_or_default(),
            Params::Query(map) => {
                let mut members: Vec<(u32, String)> = map
                    .iter()
                    .filter_map(|(key, value)| {
                        let index = key.strip_prefix(query_prefix)?.strip_prefix('.')?;
                        Some((index.parse().ok()?, value.clone()))
                    })
                    .collect();
                members.sort_by_key(|(index, _)| *index);
                members.into_iter().map(|(_, value)| value).collect()
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Result of a successful operation, ready to render
#[derive(Debug)]
pub enum Reply {
    QueueUrl(String),
    QueueUrls(Vec<String>),
    MessageSent(SentMessage),
    Messages(Vec<ReceivedMessage>),
    Attributes(BTreeMap<QueueAttributeName, String>),
    Empty,
}

impl Reply {
    pub fn to_json(&self) -> Value {
        match self {
            Self::QueueUrl(url) => json!({ "QueueUrl": url }),
            Self::QueueUrls(urls) => json!({ "QueueUrls": urls }),
            Self::MessageSent(sent) => json!({
                "MessageId": sent.message_id,
                "MD5OfMessageBody": sent.md5_of_body,
            }),
            Self::Messages(messages) => {
                let messages: Vec<Value> = messages
                    .iter()
                    .map(|msg| {
                        let mut rendered = json!({
                            "MessageId": msg.message_id,
                            "ReceiptHandle": msg.receipt_handle.as_str(),
                            "MD5OfBody": msg.md5_of_body,
                            "Body": msg.body,
                        });
                        if !msg.attributes.is_empty() {
                            let attributes: Map<String, Value> = msg
                                .attributes
                                .iter()
                                .map(|(name, value)| (name.as_str().to_string(), json!(value)))
                                .collect();
                            rendered["Attributes"] = Value::Object(attributes);
                        }
                        rendered
                    })
                    .collect();
                json!({ "Messages": messages })
            }
            Self::Attributes(attributes) => {
                let attributes: Map<String, Value> = attributes
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), json!(value)))
                    .collect();
                json!({ "Attributes": attributes })
            }
            Self::Empty => json!({}),
        }
    }

    /// Render as a query-protocol `<{action}Response>` document
    pub fn to_xml(&self, action: &str, request_id: &str) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><{}Response xmlns="{}">"#,
            action, SQS_XML_NAMESPACE
        );

        let result = self.xml_result();
        if !matches!(self, Self::Empty) {
            xml.push_str(&format!("<{0}Result>{1}</{0}Result>", action, result));
        }

        xml.push_str(&format!(
            "<ResponseMetadata><RequestId>{}</RequestId></ResponseMetadata></{}Response>",
            request_id, action
        ));
        xml
    }

    fn xml_result(&self) -> String {
        let mut xml = String::new();
        match self {
            Self::QueueUrl(url) => {
                xml.push_str(&format!("<QueueUrl>{}</QueueUrl>", escape_xml(url)));
            }
            Self::QueueUrls(urls) => {
                for url in urls {
                    xml.push_str(&format!("<QueueUrl>{}</QueueUrl>", escape_xml(url)));
                }
            }
            Self::MessageSent(sent) => {
                xml.push_str(&format!(
                    "<MD5OfMessageBody>{}</MD5OfMessageBody><MessageId>{}</MessageId>",
                    sent.md5_of_body, sent.message_id
                ));
            }
            Self::Messages(messages) => {
                for msg in messages {
                    xml.push_str("<Message>");
                    xml.push_str(&format!("<MessageId>{}</MessageId>", msg.message_id));
                    xml.push_str(&format!(
                        "<ReceiptHandle>{}</ReceiptHandle>",
                        msg.receipt_handle
                    ));
                    xml.push_str(&format!("<MD5OfBody>{}</MD5OfBody>", msg.md5_of_body));
                    xml.push_str(&format!("<Body>{}</Body>", escape_xml(&msg.body)));
                    for (name, value) in &msg.attributes {
                        xml.push_str(&format!(
                            "<Attribute><Name>{}</Name><Value>{}</Value></Attribute>",
                            name, value
                        ));
                    }
                    xml.push_str("</Message>");
                }
            }
            Self::Attributes(attributes) => {
                for (name, value) in attributes {
                    xml.push_str(&format!(
                        "<Attribute><Name>{}</Name><Value>{}</Value></Attribute>",
                        name,
                        escape_xml(value)
                    ));
                }
            }
            Self::Empty => {}
        }
        xml
    }
}
