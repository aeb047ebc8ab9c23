//! Failure taxonomy for chat turns and the text heuristics that feed it.
//!
//! Transport failures never escape a turn; they are converted into a
//! `ChatError` whose `user_message` becomes in-band reply content.

use thiserror::Error;

use crate::core::chat_stream::TransportError;
use crate::core::routes::is_ollama_provider;

/// Prefix shared by every plain error reply.
pub const ERROR_MARKER: &str = "Error:";
/// Inserted between partial content and the failure when a stream breaks.
pub const STREAM_ERROR_MARKER: &str = "[Stream Error]:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    QuotaExceeded,
    ProviderUnavailable,
    Transport,
    StreamInterrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    ModelMissing,
    ConnectionRefused,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key found for {provider}")]
    Configuration { provider: String },

    #[error("quota exceeded for {model}: {detail}")]
    QuotaExceeded { model: String, detail: String },

    #[error("{provider} unavailable: {detail}")]
    ProviderUnavailable {
        provider: String,
        model: String,
        reason: UnavailableReason,
        detail: String,
    },

    #[error("{0}")]
    Transport(String),

    #[error("stream interrupted: {cause}")]
    StreamInterrupted { cause: Box<ChatError> },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Configuration { .. } => ErrorKind::Configuration,
            ChatError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            ChatError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            ChatError::Transport(_) => ErrorKind::Transport,
            ChatError::StreamInterrupted { .. } => ErrorKind::StreamInterrupted,
        }
    }

    /// The failure that ended the turn, looking through a stream interruption.
    pub fn root(&self) -> &ChatError {
        match self {
            ChatError::StreamInterrupted { cause } => cause.root(),
            other => other,
        }
    }

    pub fn is_quota(&self) -> bool {
        let root = self.root();
        root.kind() == ErrorKind::QuotaExceeded || is_rate_limited(&root.to_string())
    }

    /// Classify a transport failure for `provider`/`model`.
    pub fn from_transport(provider: &str, model: &str, err: &TransportError) -> Self {
        let detail = err.to_string();

        if is_ollama_provider(provider) {
            let lower = detail.to_lowercase();
            if matches!(err, TransportError::Connect(_)) || lower.contains("connection refused") {
                return ChatError::ProviderUnavailable {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    reason: UnavailableReason::ConnectionRefused,
                    detail,
                };
            }
            if lower.contains("not found") || matches!(err, TransportError::Status { status: 404, .. })
            {
                return ChatError::ProviderUnavailable {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    reason: UnavailableReason::ModelMissing,
                    detail,
                };
            }
        }

        if matches!(err, TransportError::Status { status: 429, .. }) || is_rate_limited(&detail) {
            return ChatError::QuotaExceeded {
                model: model.to_string(),
                detail,
            };
        }

        ChatError::Transport(detail)
    }

    /// Human-readable text that stands in for the reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Configuration { provider } => {
                format!("{ERROR_MARKER} No API key found for {provider}.")
            }
            ChatError::QuotaExceeded { model, .. } => format!(
                "⚠️ Quota exceeded for {model}: the provider is rate limiting requests. \
                 Wait a moment or switch models."
            ),
            ChatError::ProviderUnavailable {
                model,
                reason: UnavailableReason::ModelMissing,
                ..
            } => format!(
                "{ERROR_MARKER} Ollama model '{model}' is not installed. \
                 Run `ollama pull {model}` and try again."
            ),
            ChatError::ProviderUnavailable {
                reason: UnavailableReason::ConnectionRefused,
                ..
            } => format!(
                "{ERROR_MARKER} Could not connect to Ollama. Is `ollama serve` running?"
            ),
            ChatError::Transport(message) => format!("{ERROR_MARKER} {message}"),
            ChatError::StreamInterrupted { cause } => {
                format!("\n\n{STREAM_ERROR_MARKER} {}", cause.user_message())
            }
        }
    }
}

/// Rate-limit wording in an error message raised by a provider.
pub fn is_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["429", "rate limit", "quota", "resource_exhausted"]
        .iter()
        .any(|signal| lower.contains(signal))
}

/// Detect error payloads leaked into otherwise successful stream content.
///
/// Some providers report rate limiting as JSON text inside a 200 stream, so the
/// transport never raises. Matching is case-insensitive.
pub fn classify_stream_text(text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    let quota = (lower.contains("error") && lower.contains("429"))
        || (lower.contains("quota") && lower.contains("exceeded"))
        || lower.contains("resource_exhausted");
    quota.then_some(ErrorKind::QuotaExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_text_signatures() {
        assert_eq!(
            classify_stream_text(r#"{"error": {"code": 429, "message": "slow down"}}"#),
            Some(ErrorKind::QuotaExceeded)
        );
        assert_eq!(
            classify_stream_text("Your Quota has been EXCEEDED"),
            Some(ErrorKind::QuotaExceeded)
        );
        assert_eq!(
            classify_stream_text("status: RESOURCE_EXHAUSTED"),
            Some(ErrorKind::QuotaExceeded)
        );
        assert_eq!(classify_stream_text("an error occurred"), None);
        assert_eq!(classify_stream_text("429 apples"), None);
        assert_eq!(classify_stream_text("Hello World"), None);
    }

    #[test]
    fn rate_limit_errors_become_quota() {
        let err = TransportError::Api("Rate limit reached for requests".to_string());
        let classified = ChatError::from_transport("openai", "gpt-4o-mini", &err);
        assert_eq!(classified.kind(), ErrorKind::QuotaExceeded);
        assert!(classified.user_message().contains("Quota exceeded"));

        let status = TransportError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(ChatError::from_transport("anthropic", "claude-3", &status).is_quota());
    }

    #[test]
    fn ollama_failures_get_actionable_messages() {
        let refused = TransportError::Connect("tcp connect error".to_string());
        let classified = ChatError::from_transport("ollama", "llama3", &refused);
        assert_eq!(classified.kind(), ErrorKind::ProviderUnavailable);
        assert!(classified.user_message().contains("ollama serve"));

        let missing = TransportError::Status {
            status: 404,
            body: r#"model "llama3" not found, try pulling it first"#.to_string(),
        };
        let classified = ChatError::from_transport("Ollama", "llama3", &missing);
        assert!(classified.user_message().contains("ollama pull llama3"));
    }

    #[test]
    fn connection_errors_elsewhere_are_generic() {
        let refused = TransportError::Connect("tcp connect error".to_string());
        let classified = ChatError::from_transport("openai", "gpt-4o", &refused);
        assert_eq!(classified.kind(), ErrorKind::Transport);
        assert_eq!(classified.user_message(), "Error: tcp connect error");
    }

    #[test]
    fn configuration_message_carries_marker() {
        let err = ChatError::Configuration {
            provider: "openai".to_string(),
        };
        assert!(err.user_message().starts_with(ERROR_MARKER));
    }

    #[test]
    fn interruption_wraps_cause() {
        let err = ChatError::StreamInterrupted {
            cause: Box::new(ChatError::Transport("Stream Cutoff".to_string())),
        };
        assert_eq!(err.kind(), ErrorKind::StreamInterrupted);
        assert_eq!(err.root().kind(), ErrorKind::Transport);
        assert_eq!(
            err.user_message(),
            "\n\n[Stream Error]: Error: Stream Cutoff"
        );
    }
}
