use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::{ApiKey, OracleProvider};

const ANTHROPIC_API_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub enum OracleError {
    Timeout,
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode),
    InvalidResponse,
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleError::Timeout => write!(f, "oracle request timed out"),
            OracleError::Http(err) => write!(f, "oracle HTTP error: {}", err),
            OracleError::BadStatus(status) => write!(f, "oracle returned status {}", status),
            OracleError::InvalidResponse => write!(f, "oracle returned an invalid response envelope"),
        }
    }
}

impl std::error::Error for OracleError {}

impl From<reqwest::Error> for OracleError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            OracleError::Timeout
        } else {
            // The gemini credential rides in the query string; drop the URL
            // before the error can reach a log line.
            OracleError::Http(value.without_url())
        }
    }
}

pub struct OracleClientConfig {
    pub provider: OracleProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: ApiKey,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct OracleClient {
    provider: OracleProvider,
    base_url: String,
    model: String,
    api_key: ApiKey,
    max_tokens: u32,
    http: reqwest::Client,
}

impl OracleClient {
    pub fn new(config: OracleClientConfig) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(OracleError::Http)?;

        Ok(Self {
            provider: config.provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            api_key: config.api_key,
            max_tokens: config.max_tokens,
            http,
        })
    }

    pub fn provider(&self) -> OracleProvider {
        self.provider
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        match self.provider {
            OracleProvider::Claude => self.generate_claude(prompt).await,
            OracleProvider::Gemini => self.generate_gemini(prompt).await,
        }
    }

    async fn generate_claude(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let resp = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(OracleError::BadStatus(resp.status()));
        }

        let decoded = resp
            .json::<ClaudeResponse>()
            .await
            .map_err(|_| OracleError::InvalidResponse)?;
        claude_text(decoded)
    }

    async fn generate_gemini(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]}
            ],
            "generationConfig": {"maxOutputTokens": self.max_tokens}
        });

        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.expose())])
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(OracleError::BadStatus(resp.status()));
        }

        let decoded = resp
            .json::<GeminiResponse>()
            .await
            .map_err(|_| OracleError::InvalidResponse)?;
        gemini_text(decoded)
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn claude_text(resp: ClaudeResponse) -> Result<String, OracleError> {
    resp.content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(OracleError::InvalidResponse)
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

fn gemini_text(resp: GeminiResponse) -> Result<String, OracleError> {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().find_map(|part| part.text))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(OracleError::InvalidResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_envelope_yields_first_text_block() {
        let decoded: ClaudeResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use","text":null},{"type":"text","text":"{\"overallScore\":80}"}]}"#,
        )
        .unwrap();
        assert_eq!(claude_text(decoded).unwrap(), "{\"overallScore\":80}");
    }

    #[test]
    fn claude_envelope_without_text_is_invalid() {
        let decoded: ClaudeResponse =
            serde_json::from_str(r#"{"content":[{"type":"tool_use","text":null}]}"#).unwrap();
        assert!(matches!(
            claude_text(decoded),
            Err(OracleError::InvalidResponse)
        ));
    }

    #[test]
    fn claude_empty_envelope_is_invalid() {
        let decoded: ClaudeResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(claude_text(decoded).is_err());
    }

    #[test]
    fn gemini_envelope_yields_first_part_text() {
        let decoded: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"audit body"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(gemini_text(decoded).unwrap(), "audit body");
    }

    #[test]
    fn gemini_envelope_without_candidates_is_invalid() {
        let decoded: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(
            gemini_text(decoded),
            Err(OracleError::InvalidResponse)
        ));
    }

    #[test]
    fn whitespace_only_text_is_invalid() {
        let decoded: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"   "}]}}]}"#,
        )
        .unwrap();
        assert!(gemini_text(decoded).is_err());
    }
}
