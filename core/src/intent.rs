//! Intent classification types and the intent source seam.
//!
//! The routing engine only consumes `(label, confidence)` pairs; whether they
//! come from an ML classifier or the keyword matcher below is indistinguishable
//! to it. Classifier failures are mapped to `{Unknown, 0.0}` by callers.

use serde::{Deserialize, Serialize};

/// Closed set of intents the router knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentLabel {
    /// "What time is it?" - answered offline from the local clock.
    Time,
    /// Basic arithmetic over a spoken expression.
    Arithmetic,
    /// Battery / network / device status questions.
    DeviceInfo,
    /// Greetings and small talk openers.
    Greeting,
    Weather,
    EmailSummary,
    Calendar,
    Reminder,
    /// Anything recognizable but not in a dedicated category.
    GeneralQuery,
    /// Classifier failure or unrecognizable input.
    Unknown,
}

impl IntentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLabel::Time => "time",
            IntentLabel::Arithmetic => "arithmetic",
            IntentLabel::DeviceInfo => "device_info",
            IntentLabel::Greeting => "greeting",
            IntentLabel::Weather => "weather",
            IntentLabel::EmailSummary => "email_summary",
            IntentLabel::Calendar => "calendar",
            IntentLabel::Reminder => "reminder",
            IntentLabel::GeneralQuery => "general_query",
            IntentLabel::Unknown => "unknown",
        }
    }

    /// Whether this intent has a deterministic, network-free responder.
    /// Deterministic intents are Offline-eligible independent of confidence.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            IntentLabel::Time
                | IntentLabel::Arithmetic
                | IntentLabel::DeviceInfo
                | IntentLabel::Greeting
        )
    }
}

impl std::fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classification of one utterance. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub label: IntentLabel,
    /// Classifier confidence, clamped to [0, 1].
    pub confidence: f32,
    pub raw_text: String,
}

impl IntentClassification {
    pub fn new(label: IntentLabel, confidence: f32, raw_text: impl Into<String>) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            raw_text: raw_text.into(),
        }
    }

    /// The classification used when the intent source fails.
    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self::new(IntentLabel::Unknown, 0.0, raw_text)
    }
}

/// Source of intent classifications; an ML model or a rule-based matcher.
pub trait IntentSource: Send + Sync {
    /// Classify one utterance. Errors are mapped to `{Unknown, 0.0}` by the
    /// orchestrator, never surfaced to the user directly.
    fn classify(&self, text: &str) -> anyhow::Result<IntentClassification>;
}

/// Deterministic keyword matcher for hosts without an ML classifier.
///
/// Confidence values are fixed per category; they approximate how unambiguous
/// each keyword family is in practice.
pub struct KeywordIntentSource;

impl KeywordIntentSource {
    pub fn new() -> Self {
        Self
    }

    fn contains_any(text: &str, needles: &[&str]) -> bool {
        needles.iter().any(|needle| text.contains(needle))
    }

    fn looks_arithmetic(text: &str) -> bool {
        let has_digit = text.chars().any(|c| c.is_ascii_digit());
        let has_operator = Self::contains_any(
            text,
            &["+", "-", "*", "/", "plus", "minus", "times", "divided"],
        );
        has_digit && has_operator
    }
}

impl Default for KeywordIntentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentSource for KeywordIntentSource {
    fn classify(&self, text: &str) -> anyhow::Result<IntentClassification> {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return Ok(IntentClassification::unknown(text));
        }

        let (label, confidence) = if Self::contains_any(&lowered, &["time", "clock"]) {
            (IntentLabel::Time, 0.95)
        } else if Self::looks_arithmetic(&lowered) {
            (IntentLabel::Arithmetic, 0.92)
        } else if Self::contains_any(&lowered, &["battery", "storage", "device", "charged"]) {
            (IntentLabel::DeviceInfo, 0.88)
        } else if Self::contains_any(&lowered, &["hello", "hey", "good morning", "good evening"])
            || lowered == "hi"
            || lowered.starts_with("hi ")
        {
            (IntentLabel::Greeting, 0.90)
        } else if Self::contains_any(&lowered, &["weather", "forecast", "rain", "temperature"]) {
            (IntentLabel::Weather, 0.80)
        } else if Self::contains_any(&lowered, &["email", "inbox", "mail"]) {
            (IntentLabel::EmailSummary, 0.80)
        } else if Self::contains_any(&lowered, &["calendar", "meeting", "schedule", "event"]) {
            (IntentLabel::Calendar, 0.78)
        } else if Self::contains_any(&lowered, &["remind", "reminder"]) {
            (IntentLabel::Reminder, 0.82)
        } else {
            (IntentLabel::GeneralQuery, 0.45)
        };

        Ok(IntentClassification::new(label, confidence, text))
    }
}
