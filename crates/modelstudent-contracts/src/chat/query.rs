use serde_json::Value;

/// Finish reason recorded when the endpoint supplied none.
pub const UNKNOWN_FINISH_REASON: &str = "unknown";

const NO_RESPONSE_TEXT: &str = "No response from model.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// One-line console summary.
    pub fn summary(&self) -> String {
        format!(
            "Prompt: {}  Response: {}  Total: {} (of nocap)",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseDetails {
    pub created: Option<i64>,
    pub id: Option<String>,
    pub model: Option<String>,
    pub object: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub response: String,
    /// As sent by the endpoint, also for empty answers (e.g. `content_filter`).
    pub finish_reason: String,
    /// `false` when the endpoint returned no choices or empty content.
    pub answered: bool,
    pub usage: TokenUsage,
    pub details: ResponseDetails,
}

impl QueryResult {
    pub fn no_response(finish_reason: &str, details: ResponseDetails, usage: TokenUsage) -> Self {
        Self {
            response: NO_RESPONSE_TEXT.to_string(),
            finish_reason: finish_reason.to_string(),
            answered: false,
            usage,
            details,
        }
    }

    pub fn is_no_response(&self) -> bool {
        !self.answered
    }

    /// Normalize a chat-completions response body.
    ///
    /// Missing choices or empty message content become a no-response result
    /// rather than an error; absent usage counters read as zero.
    pub fn from_chat_completion(payload: &Value) -> Self {
        let details = ResponseDetails {
            created: payload.get("created").and_then(Value::as_i64),
            id: string_field(payload, "id"),
            model: string_field(payload, "model"),
            object: string_field(payload, "object"),
        };
        let usage = payload
            .get("usage")
            .map(|usage| TokenUsage {
                prompt_tokens: u64_field(usage, "prompt_tokens"),
                completion_tokens: u64_field(usage, "completion_tokens"),
                total_tokens: u64_field(usage, "total_tokens"),
            })
            .unwrap_or_default();

        let Some(choice) = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
        else {
            return Self::no_response(UNKNOWN_FINISH_REASON, details, usage);
        };
        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_FINISH_REASON);
        let response = choice
            .pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if response.is_empty() {
            return Self::no_response(finish_reason, details, usage);
        }

        Self {
            response: response.to_string(),
            finish_reason: finish_reason.to_string(),
            answered: true,
            usage,
            details,
        }
    }

    /// Ordered `Details:` rows for the transcript.
    pub fn detail_rows(&self) -> Vec<(&'static str, String)> {
        let text = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());
        vec![
            ("finish_reason", self.finish_reason.clone()),
            (
                "created",
                self.details
                    .created
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ),
            ("id", text(&self.details.id)),
            ("model", text(&self.details.model)),
            ("object", text(&self.details.object)),
        ]
    }

    /// Ordered `Usage:` rows for the transcript.
    pub fn usage_rows(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("completion_tokens", self.usage.completion_tokens),
            ("prompt_tokens", self.usage.prompt_tokens),
            ("total_tokens", self.usage.total_tokens),
        ]
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(payload: &Value, key: &str) -> u64 {
    payload.get(key).and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{QueryResult, UNKNOWN_FINISH_REASON};

    #[test]
    fn parses_first_choice_usage_and_details() {
        let payload = json!({
            "id": "chatcmpl-9abc",
            "object": "chat.completion",
            "created": 1716000000,
            "model": "gpt-4o-2024-05-13",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  Reverse transcriptase.\n"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 412, "completion_tokens": 9, "total_tokens": 421}
        });
        let result = QueryResult::from_chat_completion(&payload);
        assert_eq!(result.response, "Reverse transcriptase.");
        assert_eq!(result.finish_reason, "stop");
        assert_eq!(result.usage.total_tokens, 421);
        assert_eq!(result.details.id.as_deref(), Some("chatcmpl-9abc"));
        assert_eq!(result.details.created, Some(1716000000));
        assert!(!result.is_no_response());
        assert_eq!(
            result.usage.summary(),
            "Prompt: 412  Response: 9  Total: 421 (of nocap)"
        );
    }

    #[test]
    fn missing_choices_is_no_response() {
        let result = QueryResult::from_chat_completion(&json!({"id": "x", "choices": []}));
        assert!(result.is_no_response());
        assert_eq!(result.response, "No response from model.");
        assert_eq!(result.finish_reason, UNKNOWN_FINISH_REASON);
        assert_eq!(result.details.id.as_deref(), Some("x"));
        assert_eq!(result.usage.total_tokens, 0);
    }

    #[test]
    fn empty_content_keeps_endpoint_finish_reason() {
        let filtered = QueryResult::from_chat_completion(&json!({
            "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]
        }));
        assert!(filtered.is_no_response());
        assert_eq!(filtered.finish_reason, "content_filter");
        assert_eq!(filtered.detail_rows()[0].1, "content_filter");

        let blank = QueryResult::from_chat_completion(&json!({
            "choices": [{"message": {"content": "   "}, "finish_reason": "length"}]
        }));
        assert!(blank.is_no_response());
        assert_eq!(blank.finish_reason, "length");
    }

    #[test]
    fn detail_rows_follow_transcript_order() {
        let result = QueryResult::from_chat_completion(&json!({
            "model": "m",
            "choices": [{"message": {"content": "a"}, "finish_reason": "length"}]
        }));
        let keys: Vec<&str> = result.detail_rows().iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["finish_reason", "created", "id", "model", "object"]);
        assert_eq!(result.detail_rows()[2].1, "None");
        assert_eq!(result.usage_rows()[0], ("completion_tokens", 0));
    }
}
