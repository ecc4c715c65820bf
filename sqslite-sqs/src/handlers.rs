//! HTTP handlers for SQS

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::Response,
};
use bytes::Bytes;
use sqslite_core::{AwsError, RequestId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SqsError;
use crate::protocol::{Protocol, Reply, SqsRequest};
use crate::storage::{
    queue_name_from_url, CreateQueueOptions, MessageAttributeName, Queue, QueueAttributeName,
    QueueRegistry,
};

const MAX_RECEIVE_BATCH: i64 = 10;
const MAX_WAIT_TIME_SECONDS: i64 = 20;

/// Handle an SQS request in either the JSON or the query protocol
pub async fn handle_request(
    State(registry): State<Arc<QueueRegistry>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::new();

    let request = match SqsRequest::parse(&headers, uri.query(), &body) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "Rejected SQS request");
            return error_response(Protocol::detect(&headers), err, &request_id);
        }
    };

    info!(action = %request.action, protocol = ?request.protocol, "SQS request");

    match dispatch(&registry, &request, uri.path()) {
        Ok(reply) => success_response(&request, &reply, &request_id),
        Err(err) => {
            warn!(action = %request.action, error = %err, "SQS request failed");
            error_response(request.protocol, err, &request_id)
        }
    }
}

fn dispatch(registry: &QueueRegistry, request: &SqsRequest, path: &str) -> Result<Reply, SqsError> {
    match request.action.as_str() {
        "CreateQueue" => create_queue(registry, request),
        "DeleteQueue" => delete_queue(registry, request, path),
        "ListQueues" => Ok(list_queues(registry, request)),
        "GetQueueUrl" => get_queue_url(registry, request),
        "SendMessage" => send_message(registry, request, path),
        "ReceiveMessage" => receive_message(registry, request, path),
        "DeleteMessage" => delete_message(registry, request, path),
        "ChangeMessageVisibility" => change_message_visibility(registry, request, path),
        "GetQueueAttributes" => get_queue_attributes(registry, request, path),
        "SetQueueAttributes" => set_queue_attributes(registry, request, path),
        "PurgeQueue" => purge_queue(registry, request, path),
        other => Err(SqsError::UnknownOperation(other.to_string())),
    }
}

// === Queue resolution ===

/// Name of the queue a request targets: its `QueueUrl`, or the request path
/// when a query-protocol client posts straight to the queue URL.
fn target_name(request: &SqsRequest, path: &str) -> Result<String, SqsError> {
    if let Some(url) = request.string("QueueUrl") {
        return Ok(queue_name_from_url(&url).to_string());
    }

    let path = path.trim_matches('/');
    if path.contains('/') {
        Ok(queue_name_from_url(path).to_string())
    } else {
        Err(SqsError::MissingParameter("QueueUrl".to_string()))
    }
}

fn target_queue(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Arc<Queue>, SqsError> {
    registry.resolve(&target_name(request, path)?)
}

// === Handlers ===

fn create_queue(registry: &QueueRegistry, request: &SqsRequest) -> Result<Reply, SqsError> {
    let name = request.required("QueueName")?;
    let options = CreateQueueOptions::from_attributes(&request.attribute_map())?;
    let queue = registry.create_queue(&name, &options)?;
    Ok(Reply::QueueUrl(queue.url().to_string()))
}

fn delete_queue(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    registry.delete_queue(&target_name(request, path)?);
    Ok(Reply::Empty)
}

fn list_queues(registry: &QueueRegistry, request: &SqsRequest) -> Reply {
    let prefix = request.string("QueueNamePrefix");
    let urls = registry
        .list_queues(prefix.as_deref())
        .iter()
        .map(|queue| queue.url().to_string())
        .collect();
    Reply::QueueUrls(urls)
}

fn get_queue_url(registry: &QueueRegistry, request: &SqsRequest) -> Result<Reply, SqsError> {
    let name = request.required("QueueName")?;
    registry.get_queue_url(&name).map(Reply::QueueUrl)
}

fn send_message(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let body = request.required("MessageBody")?;
    let queue = target_queue(registry, request, path)?;
    queue.send_message(body).map(Reply::MessageSent)
}

fn receive_message(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let queue = target_queue(registry, request, path)?;

    let max = request.integer("MaxNumberOfMessages")?.unwrap_or(1);
    if !(1..=MAX_RECEIVE_BATCH).contains(&max) {
        return Err(SqsError::InvalidParameter(format!(
            "MaxNumberOfMessages must be between 1 and {}, got {}",
            MAX_RECEIVE_BATCH, max
        )));
    }
    // Accepted for compatibility; receives never wait
    if let Some(wait) = request.integer("WaitTimeSeconds")? {
        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&wait) {
            return Err(SqsError::InvalidParameter(format!(
                "WaitTimeSeconds must be between 0 and {}, got {}",
                MAX_WAIT_TIME_SECONDS, wait
            )));
        }
    }
    let visibility_timeout = request.integer("VisibilityTimeout")?;
    let selected = selected_message_attributes(request);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut messages = queue.receive_messages(max as usize, visibility_timeout)?;
    for message in &mut messages {
        message.attributes.retain(|name, _| selected.contains(name));
    }
    Ok(Reply::Messages(messages))
}

/// Per-message attributes the caller asked for, with `All` expanded
fn selected_message_attributes(request: &SqsRequest) -> BTreeSet<MessageAttributeName> {
    let mut names = request.list("AttributeNames", "AttributeName");
    names.extend(request.list("MessageSystemAttributeNames", "MessageSystemAttributeName"));

    let parsed: BTreeSet<MessageAttributeName> =
        names.iter().filter_map(|name| name.parse().ok()).collect();
    if parsed.contains(&MessageAttributeName::All) {
        MessageAttributeName::ALL.into_iter().collect()
    } else {
        parsed
    }
}

fn delete_message(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let receipt_handle = request.required("ReceiptHandle")?;
    let queue = target_queue(registry, request, path)?;
    queue.delete_message(&receipt_handle)?;
    Ok(Reply::Empty)
}

fn change_message_visibility(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let receipt_handle = request.required("ReceiptHandle")?;
    let timeout = request
        .integer("VisibilityTimeout")?
        .ok_or_else(|| SqsError::MissingParameter("VisibilityTimeout".to_string()))?;
    let queue = target_queue(registry, request, path)?;
    queue.change_message_visibility(&receipt_handle, timeout)?;
    Ok(Reply::Empty)
}

fn get_queue_attributes(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let queue = target_queue(registry, request, path)?;
    let names = request
        .list("AttributeNames", "AttributeName")
        .iter()
        .map(|name| name.parse::<QueueAttributeName>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Reply::Attributes(queue.get_attributes(&names)))
}

fn set_queue_attributes(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    let queue = target_queue(registry, request, path)?;
    queue.set_attributes(&request.attribute_map())?;
    Ok(Reply::Empty)
}

fn purge_queue(
    registry: &QueueRegistry,
    request: &SqsRequest,
    path: &str,
) -> Result<Reply, SqsError> {
    target_queue(registry, request, path)?.purge();
    Ok(Reply::Empty)
}

// === Responses ===

fn success_response(request: &SqsRequest, reply: &Reply, request_id: &RequestId) -> Response {
    let body = match request.protocol {
        Protocol::Json => reply.to_json().to_string(),
        Protocol::Query => reply.to_xml(&request.action, &request_id.id),
    };
    build_response(StatusCode::OK, request.protocol, body, request_id)
}

fn error_response(protocol: Protocol, err: SqsError, request_id: &RequestId) -> Response {
    let error = AwsError::from(err).with_request_id(request_id.id.clone());
    let status =
        StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::BAD_REQUEST);

    let mut response = match protocol {
        Protocol::Json => build_response(status, protocol, error.to_json(), request_id),
        Protocol::Query => build_response(status, protocol, error.to_xml(), request_id),
    };
    if protocol == Protocol::Json {
        if let Ok(value) = HeaderValue::from_str(&error.query_error_header()) {
            response.headers_mut().insert("x-amzn-query-error", value);
        }
    }
    response
}

fn build_response(
    status: StatusCode,
    protocol: Protocol,
    body: String,
    request_id: &RequestId,
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(protocol.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&request_id.id) {
        response.headers_mut().insert("x-amzn-requestid", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, RegistryConfig};
    use axum::body::to_bytes;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn state() -> (Arc<QueueRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let registry = QueueRegistry::with_clock(RegistryConfig::default(), clock.clone());
        (Arc::new(registry), clock)
    }

    async fn call_json(
        registry: &Arc<QueueRegistry>,
        action: &str,
        body: Value,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-amz-target",
            HeaderValue::from_str(&format!("AmazonSQS.{}", action)).unwrap(),
        );
        let response = handle_request(
            State(registry.clone()),
            Uri::from_static("/"),
            headers,
            Bytes::from(body.to_string()),
        )
        .await;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    async fn call_query(
        registry: &Arc<QueueRegistry>,
        uri: &'static str,
        form: &str,
    ) -> (StatusCode, String) {
        let response = handle_request(
            State(registry.clone()),
            Uri::from_static(uri),
            HeaderMap::new(),
            Bytes::from(form.to_string()),
        )
        .await;

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send(registry: &Arc<QueueRegistry>, url: &str, body: &str) -> Value {
        let (_, _, sent) = call_json(
            registry,
            "SendMessage",
            json!({ "QueueUrl": url, "MessageBody": body }),
        )
        .await;
        sent
    }

    async fn create(registry: &Arc<QueueRegistry>, name: &str, visibility_timeout: &str) -> String {
        let (_, _, body) = call_json(
            registry,
            "CreateQueue",
            json!({ "QueueName": name, "Attributes": { "VisibilityTimeout": visibility_timeout } }),
        )
        .await;
        body["QueueUrl"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_json_send_receive_delete() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;

        let sent = send(&registry, &url, "hi").await;
        assert_eq!(sent["MD5OfMessageBody"], "49f68a5c8493ec2c0bf489821c21fc3b");

        let (_, _, received) = call_json(
            &registry,
            "ReceiveMessage",
            json!({ "QueueUrl": url, "AttributeNames": ["All"] }),
        )
        .await;
        let message = &received["Messages"][0];
        assert_eq!(message["Body"], "hi");
        assert_eq!(message["MessageId"], sent["MessageId"]);
        assert_eq!(message["Attributes"]["ApproximateReceiveCount"], "0");

        let handle = message["ReceiptHandle"].as_str().unwrap();
        let (status, _, _) = call_json(
            &registry,
            "DeleteMessage",
            json!({ "QueueUrl": url, "ReceiptHandle": handle }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(registry.resolve("orders").unwrap().counts().in_flight, 0);
    }

    #[tokio::test]
    async fn test_json_receive_without_attribute_names() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;
        send(&registry, &url, "hi").await;

        let (_, _, received) =
            call_json(&registry, "ReceiveMessage", json!({ "QueueUrl": url })).await;
        assert!(received["Messages"][0].get("Attributes").is_none());
    }

    #[tokio::test]
    async fn test_json_receive_empty() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;

        let (_, _, received) =
            call_json(&registry, "ReceiveMessage", json!({ "QueueUrl": url })).await;
        assert_eq!(received["Messages"], json!([]));
    }

    #[tokio::test]
    async fn test_json_redelivery_after_timeout() {
        let (registry, clock) = state();
        let url = create(&registry, "orders", "1").await;
        send(&registry, &url, "Message 1").await;

        let receive = json!({
            "QueueUrl": url,
            "MessageSystemAttributeNames": ["ApproximateReceiveCount"],
        });
        let (_, _, first) = call_json(&registry, "ReceiveMessage", receive.clone()).await;
        assert_eq!(first["Messages"][0]["Body"], "Message 1");

        let (_, _, hidden) = call_json(&registry, "ReceiveMessage", receive.clone()).await;
        assert_eq!(hidden["Messages"], json!([]));

        clock.advance(Duration::milliseconds(1100));
        let (_, _, again) = call_json(&registry, "ReceiveMessage", receive).await;
        assert_eq!(again["Messages"][0]["Body"], "Message 1");
        assert_eq!(again["Messages"][0]["Attributes"]["ApproximateReceiveCount"], "1");
    }

    #[tokio::test]
    async fn test_json_queue_attributes() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;
        for body in ["a", "b", "c"] {
            send(&registry, &url, body).await;
        }
        call_json(&registry, "ReceiveMessage", json!({ "QueueUrl": url })).await;

        let (_, _, attrs) = call_json(
            &registry,
            "GetQueueAttributes",
            json!({ "QueueUrl": url, "AttributeNames": ["All"] }),
        )
        .await;
        assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessages"], "2");
        assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessagesNotVisible"], "1");
        assert_eq!(attrs["Attributes"]["VisibilityTimeout"], "30");

        call_json(
            &registry,
            "SetQueueAttributes",
            json!({ "QueueUrl": url, "Attributes": { "VisibilityTimeout": "5" } }),
        )
        .await;
        let (_, _, attrs) = call_json(
            &registry,
            "GetQueueAttributes",
            json!({ "QueueUrl": url, "AttributeNames": ["VisibilityTimeout"] }),
        )
        .await;
        assert_eq!(attrs["Attributes"], json!({ "VisibilityTimeout": "5" }));
    }

    #[tokio::test]
    async fn test_json_invalid_attribute_value() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;

        let (status, headers, body) = call_json(
            &registry,
            "SetQueueAttributes",
            json!({ "QueueUrl": url, "Attributes": { "QueueArn": "arn:aws:sqs:x" } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidAttributeValue");
        assert_eq!(headers["x-amzn-query-error"], "InvalidAttributeValue;Sender");

        let (_, _, body) = call_json(
            &registry,
            "CreateQueue",
            json!({ "QueueName": "other", "Attributes": { "VisibilityTimeout": "99999" } }),
        )
        .await;
        assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidAttributeValue");
        assert!(registry.resolve("other").is_err());
    }

    #[tokio::test]
    async fn test_json_missing_queue_error() {
        let (registry, _) = state();
        let (status, headers, body) = call_json(
            &registry,
            "SendMessage",
            json!({ "QueueUrl": "http://localhost:4566/000000000000/nope", "MessageBody": "x" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["__type"], "com.amazonaws.sqs#QueueDoesNotExist");
        assert_eq!(
            headers["x-amzn-query-error"],
            "AWS.SimpleQueueService.NonExistentQueue;Sender"
        );
        assert!(headers.contains_key("x-amzn-requestid"));
    }

    #[tokio::test]
    async fn test_json_unknown_action() {
        let (registry, _) = state();
        let (status, _, body) = call_json(&registry, "Teleport", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidAction");
    }

    #[tokio::test]
    async fn test_json_missing_parameter() {
        let (registry, _) = state();
        let (_, _, body) = call_json(&registry, "CreateQueue", json!({})).await;
        assert_eq!(body["__type"], "com.amazonaws.sqs#MissingParameter");
    }

    #[tokio::test]
    async fn test_json_receive_batch_limits() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;

        let (_, _, body) = call_json(
            &registry,
            "ReceiveMessage",
            json!({ "QueueUrl": url, "MaxNumberOfMessages": 11 }),
        )
        .await;
        assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidParameterValue");

        for i in 0..4 {
            send(&registry, &url, &format!("m{}", i)).await;
        }
        let (_, _, body) = call_json(
            &registry,
            "ReceiveMessage",
            json!({ "QueueUrl": url, "MaxNumberOfMessages": 10, "WaitTimeSeconds": 20 }),
        )
        .await;
        assert_eq!(body["Messages"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_json_list_queues_prefix() {
        let (registry, _) = state();
        create(&registry, "aaaQueue", "30").await;
        create(&registry, "bbbQueue", "30").await;

        let (_, _, body) =
            call_json(&registry, "ListQueues", json!({ "QueueNamePrefix": "aaa" })).await;
        let urls = body["QueueUrls"].as_array().unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].as_str().unwrap().contains("aaaQueue"));
    }

    #[tokio::test]
    async fn test_json_delete_queue_idempotent() {
        let (registry, _) = state();
        let url = create(&registry, "orders", "30").await;

        for _ in 0..2 {
            let (status, _, _) =
                call_json(&registry, "DeleteQueue", json!({ "QueueUrl": url })).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, _, body) =
            call_json(&registry, "GetQueueUrl", json!({ "QueueName": "orders" })).await;
        assert_eq!(body["__type"], "com.amazonaws.sqs#QueueDoesNotExist");
    }

    #[tokio::test]
    async fn test_query_protocol_round_trip() {
        let (registry, _) = state();
        let (status, xml) = call_query(&registry, "/", "Action=CreateQueue&QueueName=legacy").await;
        assert_eq!(status, StatusCode::OK);
        assert!(xml.contains("<QueueUrl>http://localhost:4566/000000000000/legacy</QueueUrl>"));

        let (_, xml) = call_query(
            &registry,
            "/000000000000/legacy",
            "Action=SendMessage&MessageBody=%3Chello%3E",
        )
        .await;
        assert!(xml.contains("<SendMessageResult>"));

        let (_, xml) = call_query(
            &registry,
            "/000000000000/legacy",
            "Action=ReceiveMessage&AttributeName.1=SentTimestamp",
        )
        .await;
        assert!(xml.contains("<Body>&lt;hello&gt;</Body>"));
        assert!(xml.contains("<Name>SentTimestamp</Name>"));
        assert!(!xml.contains("ApproximateReceiveCount"));
    }

    #[tokio::test]
    async fn test_query_error_document() {
        let (registry, _) = state();
        let (status, xml) = call_query(
            &registry,
            "/",
            concat!(
                "Action=GetQueueAttributes",
                "&QueueUrl=http%3A%2F%2Flocalhost%3A4566%2F000000000000%2Fmissing",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(xml.contains("<ErrorResponse"));
        assert!(xml.contains("<Code>AWS.SimpleQueueService.NonExistentQueue</Code>"));
    }

    #[tokio::test]
    async fn test_query_requires_queue_url_at_root() {
        let (registry, _) = state();
        let (status, xml) = call_query(&registry, "/", "Action=PurgeQueue").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(xml.contains("<Code>MissingParameter</Code>"));
    }
}
