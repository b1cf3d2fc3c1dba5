use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::types::AuthCode;

/// Message posted by the callback page to its opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthMessage {
    #[serde(rename = "auth-callback")]
    Callback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    #[serde(rename = "auth-error")]
    Error {
        #[serde(default, deserialize_with = "null_as_empty")]
        error: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        description: String,
    },
}

/// Callback pages post `description: null` when the provider sent no
/// `error_description`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// What the opener does with a same-origin message.
#[derive(Debug)]
pub(crate) enum Disposition {
    Exchange(AuthCode),
    Fail(Error),
    Ignore,
}

impl AuthMessage {
    #[must_use]
    pub fn callback(code: impl Into<String>) -> Self {
        Self::Callback {
            code: Some(code.into()),
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            description: description.into(),
        }
    }

    /// JSON payload for `postMessage`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Callback { code } => serde_json::json!({
                "type": "auth-callback",
                "code": code,
            }),
            Self::Error { error, description } => serde_json::json!({
                "type": "auth-error",
                "error": error,
                "description": description,
            }),
        }
    }

    /// Classify an arbitrary message payload. Unknown shapes and callbacks
    /// without a code are ignored.
    pub(crate) fn classify(data: &Value) -> Disposition {
        match serde_json::from_value::<Self>(data.clone()) {
            Ok(Self::Callback { code: Some(code) }) if !code.is_empty() => {
                Disposition::Exchange(AuthCode::new(code))
            }
            Ok(Self::Error { error, description }) => {
                Disposition::Fail(Error::Provider { error, description })
            }
            _ => Disposition::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn callback_payload_shape() {
        assert_eq!(
            AuthMessage::callback("abc123").to_json(),
            json!({"type": "auth-callback", "code": "abc123"})
        );
    }

    #[test]
    fn error_payload_shape() {
        assert_eq!(
            AuthMessage::error("access_denied", "User cancelled").to_json(),
            json!({"type": "auth-error", "error": "access_denied", "description": "User cancelled"})
        );
    }

    #[test]
    fn classify_callback_with_code() {
        let disposition = AuthMessage::classify(&json!({"type": "auth-callback", "code": "abc"}));
        assert!(matches!(disposition, Disposition::Exchange(code) if code.as_str() == "abc"));
    }

    #[test]
    fn classify_error_builds_provider_error() {
        let disposition = AuthMessage::classify(&json!({
            "type": "auth-error",
            "error": "access_denied",
            "description": "User cancelled",
        }));
        match disposition {
            Disposition::Fail(err) => assert_eq!(err.to_string(), "access_denied: User cancelled"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classify_error_tolerates_null_fields() {
        let disposition = AuthMessage::classify(&json!({
            "type": "auth-error",
            "error": "access_denied",
            "description": null,
        }));
        match disposition {
            Disposition::Fail(err) => assert_eq!(err.to_string(), "access_denied: "),
            other => panic!("unexpected {other:?}"),
        }

        let disposition = AuthMessage::classify(&json!({"type": "auth-error", "error": null}));
        assert!(matches!(disposition, Disposition::Fail(Error::Provider { .. })));
    }

    #[test]
    fn classify_ignores_other_shapes() {
        for data in [
            json!({"type": "auth-callback"}),
            json!({"type": "auth-callback", "code": ""}),
            json!({"type": "webpackOk"}),
            json!("hello"),
            json!(null),
        ] {
            assert!(
                matches!(AuthMessage::classify(&data), Disposition::Ignore),
                "{data}"
            );
        }
    }
}
