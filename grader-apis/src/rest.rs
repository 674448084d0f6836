use crate::live::LiveStatus;
use serde::{de::Error, Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Base64 encoding for binary data
pub struct ByteString(pub Vec<u8>);

impl Serialize for ByteString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let repr = base64::encode(&self.0);
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ByteString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = String::deserialize(deserializer)?;
        base64::decode(&repr).map(ByteString).map_err(|err| {
            D::Error::custom(format_args!(
                "expected valid base64-encoded string: {:#}",
                err
            ))
        })
    }
}

/// Grading request
#[derive(Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Identity the best score is stored under (a validated email)
    pub user_id: String,
    /// Submission source, as a base64-encoded string
    pub run_source: ByteString,
    /// Additional metadata. Grader will simply preserve it.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Information about a previously created submission
#[derive(Serialize, Deserialize)]
pub struct Submission {
    /// Identifier of the submission
    pub id: Uuid,
    /// Annotations as specified in the request
    pub annotations: HashMap<String, String>,
    /// Whether grading has finished
    pub completed: bool,
    /// Whether the grading report can be fetched
    pub report_ready: bool,
    /// Live status
    pub live: LiveStatus,
    /// Error message, if grading failed
    pub error: Option<String>,
}
