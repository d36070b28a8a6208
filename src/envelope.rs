// Supabase MCP Gateway - Response Envelope
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One shape for every invocation result. Success carries a rendered
// payload, every other outcome carries a message. Never both, never neither.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Outcome category of a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    /// Backend call completed, payload rendered
    Success,
    /// Backend reachable, operation rejected
    CapabilityError,
    /// Unknown capability or bad arguments — backend never contacted
    ValidationError,
    /// Backend unreachable, timed out, cancelled, or response unparsable
    TransportError,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::CapabilityError,
        Outcome::ValidationError,
        Outcome::TransportError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "Success",
            Outcome::CapabilityError => "CapabilityError",
            Outcome::ValidationError => "ValidationError",
            Outcome::TransportError => "TransportError",
        }
    }

    /// Caller may retry the same invocation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::TransportError)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Body {
    Payload(String),
    Message(String),
}

/// Uniform response returned for every invocation.
///
/// Fields are private: the constructors are the only way to build one,
/// which keeps payload/message exclusivity tied to the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    outcome: Outcome,
    body: Body,
}

impl ResponseEnvelope {
    pub fn success(payload: impl Into<String>) -> Self {
        Self { outcome: Outcome::Success, body: Body::Payload(payload.into()) }
    }

    pub fn capability_error(message: impl Into<String>) -> Self {
        Self { outcome: Outcome::CapabilityError, body: Body::Message(message.into()) }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self { outcome: Outcome::ValidationError, body: Body::Message(message.into()) }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self { outcome: Outcome::TransportError, body: Body::Message(message.into()) }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn payload(&self) -> Option<&str> {
        match &self.body {
            Body::Payload(p) => Some(p),
            Body::Message(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.body {
            Body::Message(m) => Some(m),
            Body::Payload(_) => None,
        }
    }

    /// Text shown to the calling agent. Failures are prefixed with their
    /// outcome so the category survives flattening to plain text.
    pub fn display_text(&self) -> String {
        match &self.body {
            Body::Payload(p) => p.clone(),
            Body::Message(m) => format!("{}: {}", self.outcome, m),
        }
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ResponseEnvelope", 2)?;
        s.serialize_field("outcome", &self.outcome)?;
        match &self.body {
            Body::Payload(p) => s.serialize_field("payload", p)?,
            Body::Message(m) => s.serialize_field("message", m)?,
        }
        s.end()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn build(outcome: Outcome, text: &str) -> ResponseEnvelope {
        match outcome {
            Outcome::Success => ResponseEnvelope::success(text),
            Outcome::CapabilityError => ResponseEnvelope::capability_error(text),
            Outcome::ValidationError => ResponseEnvelope::validation_error(text),
            Outcome::TransportError => ResponseEnvelope::transport_error(text),
        }
    }

    #[test]
    fn exactly_one_of_payload_or_message() {
        for outcome in Outcome::ALL {
            for text in ["", "x", "multi\nline"] {
                let env = build(outcome, text);
                assert_eq!(env.outcome(), outcome);
                assert!(
                    env.payload().is_some() ^ env.message().is_some(),
                    "{} must set exactly one field", outcome
                );
                assert_eq!(env.payload().is_some(), outcome == Outcome::Success);
            }
        }
    }

    #[test]
    fn serialized_form_omits_the_other_field() {
        for outcome in Outcome::ALL {
            let json = serde_json::to_value(build(outcome, "body")).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 2);
            assert_eq!(obj["outcome"], outcome.as_str());
            assert_eq!(obj.contains_key("payload"), outcome == Outcome::Success);
            assert_eq!(obj.contains_key("message"), outcome != Outcome::Success);
        }
    }

    #[test]
    fn display_text_prefixes_failures() {
        assert_eq!(ResponseEnvelope::success("ok").display_text(), "ok");
        assert_eq!(
            ResponseEnvelope::transport_error("connection refused").display_text(),
            "TransportError: connection refused"
        );
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(Outcome::TransportError.is_retryable());
        assert!(!Outcome::ValidationError.is_retryable());
        assert!(!Outcome::CapabilityError.is_retryable());
        assert!(!Outcome::Success.is_retryable());
    }
}
