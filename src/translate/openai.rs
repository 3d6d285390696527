use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{TextTranslator, TranslateFuture};
use crate::error::OverlayError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOOL_NAME: &str = "deliver_translation";

/// Translates through an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiTranslator {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
    source_lang: String,
    target_lang: String,
}

impl OpenAiTranslator {
    pub fn new(key: impl Into<String>, source_lang: &str, target_lang: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You translate short fields of business documents from {} to {}. \
             Translate only the user text. Keep placeholders such as __NUM_12__, \
             numbers, codes and punctuation unchanged. Return the result by calling {}.",
            self.source_lang, self.target_lang, TOOL_NAME
        )
    }

    async fn call(&self, text: &str) -> Result<String> {
        if self.key.trim().is_empty() {
            return Err(anyhow!(
                "OpenAI API key is not set (--key, [translate] api_key or OPENAI_API_KEY)"
            ));
        }
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt()},
                {"role": "user", "content": text}
            ],
            "tools": [
                {
                    "type": "function",
                    "function": {
                        "name": TOOL_NAME,
                        "description": "Deliver the translated text.",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "translation": {"type": "string"}
                            },
                            "required": ["translation"]
                        }
                    }
                }
            ],
            "tool_choice": {"type": "function", "function": {"name": TOOL_NAME}}
        });

        let mut attempt = 0usize;
        let mut delay = RATE_LIMIT_BASE_DELAY;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("failed to reach {}", url))?;

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&text);
            }
            if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                delay = wait_with_backoff("OpenAI", attempt, delay, retry_after).await;
                continue;
            }
            return Err(anyhow!(
                "OpenAI API error ({}): {}",
                status,
                extract_openai_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl TextTranslator for OpenAiTranslator {
    fn translate<'a>(&'a self, text: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            self.call(text)
                .await
                .map_err(|err| OverlayError::Translation(format!("{err:#}")))
        })
    }
}

fn extract_translation(text: &str) -> Result<String> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;
    if tool_call.function.name != TOOL_NAME {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }
    let args: TranslationArgs = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    Ok(args.translation)
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts: Vec<String> = [error.message, error.code.map(|code| format!("code: {code}"))]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct TranslationArgs {
    translation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_translation_from_tool_call() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/openai_tool_response.json"
        ));
        let translation = extract_translation(payload).unwrap();
        assert_eq!(translation, "कुल देय राशि __NUM_245__");
    }

    #[test]
    fn missing_tool_call_is_an_error() {
        let payload = r#"{"choices": [{"message": {"content": "hello"}}]}"#;
        assert!(extract_translation(payload).is_err());
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let translator = OpenAiTranslator::new("", "en", "hi").with_base_url("http://127.0.0.1:9");
        let err = translator.translate("Total").await.unwrap_err();
        assert!(matches!(err, OverlayError::Translation(ref message) if message.contains("API key")));
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("Incorrect API key provided | code: invalid_api_key")
        );
        assert_eq!(extract_openai_error("not json"), None);
    }
}
