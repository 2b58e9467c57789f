// gemini.rs — Request/response envelope for the `generateContent` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{AiError, InferenceRequest};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 of the raw image bytes.
    pub data: String,
}

impl From<&InferenceRequest> for GenerateContentRequest {
    fn from(request: &InferenceRequest) -> Self {
        let mut parts = vec![Part::Text {
            text: request.instruction().to_string(),
        }];
        if let Some(image) = request.image() {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type().to_string(),
                    data: image.to_base64(),
                },
            });
        }
        Self {
            contents: vec![Content {
                role: "user".into(),
                parts,
            }],
        }
    }
}

// Response side. Only the fields that are read are modelled.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// `{base}/v1beta/models/{model}:generateContent?key={api_key}`
pub fn endpoint_url(base_url: &str, model: &str, api_key: &str) -> Result<Url, AiError> {
    let base = base_url.trim_end_matches('/');
    Url::parse_with_params(
        &format!("{base}/v1beta/models/{model}:generateContent"),
        &[("key", api_key)],
    )
    .map_err(|e| AiError::ConfigError(format!("bad endpoint URL: {e}")))
}

/// The endpoint without its query string, safe to log.
pub fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

pub fn build_request_body(request: &InferenceRequest) -> Value {
    // A derived Serialize over strings and vecs cannot fail.
    serde_json::to_value(GenerateContentRequest::from(request)).unwrap_or(Value::Null)
}

/// Pull `candidates[0].content.parts[*].text` out of a success body.
///
/// A body that is not JSON at all is a `MalformedBody` (delivery problem,
/// retryable). JSON that lacks the expected shape is an
/// `EmptyOrMalformedResponse` (the model answered, just not usefully).
pub fn parse_response(body: &str) -> Result<String, AiError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AiError::MalformedBody(format!("invalid JSON: {e}")))?;

    let parsed: GenerateContentResponse = serde_json::from_value(value)
        .map_err(|e| AiError::EmptyOrMalformedResponse(format!("unexpected envelope: {e}")))?;

    let Some(first) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map(|r| format!("no candidates (blocked: {r})"))
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(AiError::EmptyOrMalformedResponse(reason));
    };

    first
        .content
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| {
            AiError::EmptyOrMalformedResponse("first candidate has no text part".into())
        })
}
