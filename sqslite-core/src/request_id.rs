//! Request ID generation

use uuid::Uuid;

/// AWS-style request ID, echoed in `x-amzn-RequestId` and `ResponseMetadata`
#[derive(Debug, Clone)]
pub struct RequestId {
    pub id: String,
}

impl RequestId {
    /// Generate a new request ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().hyphenated().to_string(),
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        assert_ne!(id1.id, id2.id);
        assert!(Uuid::parse_str(&id1.id).is_ok());
        assert_eq!(id1.id.len(), 36);
    }
}
