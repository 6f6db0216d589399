//! The standard offline responders: clock, arithmetic, device info, greeting.

use super::{OfflineHandler, OfflineHandlerError, OfflineResponse};
use crate::device::DeviceStateProbe;
use crate::intent::IntentLabel;
use std::sync::Arc;

/// Answers "what time is it" style questions from the local clock.
pub struct ClockHandler;

impl ClockHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClockHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineHandler for ClockHandler {
    fn label(&self) -> IntentLabel {
        IntentLabel::Time
    }

    fn handle(&self, _raw_text: &str) -> Result<OfflineResponse, OfflineHandlerError> {
        let now = chrono::Local::now();
        Ok(OfflineResponse::new(format!(
            "It's {}.",
            now.format("%H:%M")
        )))
    }
}

/// Evaluates small spoken arithmetic expressions.
///
/// Accepts both symbolic ("12 + 5 * 2") and spoken ("twelve" is out of scope,
/// but "12 plus 5 times 2" works) operator forms. Multiplication and division
/// bind tighter than addition and subtraction.
pub struct ArithmeticHandler;

impl ArithmeticHandler {
    pub fn new() -> Self {
        Self
    }

    fn tokenize(raw_text: &str) -> Result<Vec<Token>, OfflineHandlerError> {
        let normalized = raw_text
            .to_lowercase()
            .replace("multiplied by", "*")
            .replace("divided by", "/")
            .replace("times", "*")
            .replace("plus", "+")
            .replace("minus", "-")
            .replace('x', "*");

        let mut tokens = Vec::new();
        let mut number = String::new();
        for ch in normalized.chars() {
            match ch {
                '0'..='9' | '.' => number.push(ch),
                '+' | '-' | '*' | '/' => {
                    if !number.is_empty() {
                        tokens.push(Token::Number(Self::parse_number(&number)?));
                        number.clear();
                    }
                    tokens.push(Token::Operator(ch));
                }
                _ => {
                    // Words and punctuation around the expression are ignored;
                    // they just delimit numbers.
                    if !number.is_empty() {
                        tokens.push(Token::Number(Self::parse_number(&number)?));
                        number.clear();
                    }
                }
            }
        }
        if !number.is_empty() {
            tokens.push(Token::Number(Self::parse_number(&number)?));
        }
        Ok(tokens)
    }

    fn parse_number(text: &str) -> Result<f64, OfflineHandlerError> {
        text.parse::<f64>().map_err(|_| {
            OfflineHandlerError::CannotAnswer(format!("'{}' is not a number", text))
        })
    }

    /// Evaluate `number (op number)*` with `*` and `/` binding tighter.
    fn evaluate(tokens: &[Token]) -> Result<f64, OfflineHandlerError> {
        let malformed = || OfflineHandlerError::CannotAnswer("malformed expression".to_string());

        if tokens.is_empty() {
            return Err(OfflineHandlerError::CannotAnswer(
                "no arithmetic expression found".to_string(),
            ));
        }

        let mut terms: Vec<f64> = Vec::new();
        let mut pending_add_op = '+';
        let mut current = match tokens.first() {
            Some(Token::Number(n)) => *n,
            _ => return Err(malformed()),
        };

        let mut index = 1;
        while index < tokens.len() {
            let op = match tokens.get(index) {
                Some(Token::Operator(op)) => *op,
                Some(Token::Number(_)) => return Err(malformed()),
                None => break,
            };
            let rhs = match tokens.get(index + 1) {
                Some(Token::Number(n)) => *n,
                _ => return Err(malformed()),
            };
            match op {
                '*' => current *= rhs,
                '/' => {
                    if rhs == 0.0 {
                        return Err(OfflineHandlerError::CannotAnswer(
                            "division by zero".to_string(),
                        ));
                    }
                    current /= rhs;
                }
                '+' | '-' => {
                    terms.push(apply_sign(pending_add_op, current));
                    pending_add_op = op;
                    current = rhs;
                }
                _ => return Err(malformed()),
            }
            index += 2;
        }
        terms.push(apply_sign(pending_add_op, current));

        Ok(terms.iter().sum())
    }

    fn format_result(value: f64) -> String {
        if (value.fract()).abs() < 1e-9 {
            format!("{}", value.round() as i64)
        } else {
            format!("{:.2}", value)
        }
    }
}

fn apply_sign(op: char, value: f64) -> f64 {
    if op == '-' {
        -value
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Operator(char),
}

impl Default for ArithmeticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineHandler for ArithmeticHandler {
    fn label(&self) -> IntentLabel {
        IntentLabel::Arithmetic
    }

    fn handle(&self, raw_text: &str) -> Result<OfflineResponse, OfflineHandlerError> {
        let tokens = Self::tokenize(raw_text)?;
        let value = Self::evaluate(&tokens)?;
        Ok(OfflineResponse::new(format!(
            "That's {}.",
            Self::format_result(value)
        )))
    }
}

/// Reports battery and network status from the injected probe.
pub struct DeviceInfoHandler {
    probe: Arc<dyn DeviceStateProbe>,
}

impl DeviceInfoHandler {
    pub fn new(probe: Arc<dyn DeviceStateProbe>) -> Self {
        Self { probe }
    }
}

impl OfflineHandler for DeviceInfoHandler {
    fn label(&self) -> IntentLabel {
        IntentLabel::DeviceInfo
    }

    fn handle(&self, _raw_text: &str) -> Result<OfflineResponse, OfflineHandlerError> {
        let snapshot = self.probe.snapshot();
        let battery_pct = (snapshot.battery_level * 100.0).round() as u32;
        let charging = if snapshot.is_charging {
            " and charging"
        } else {
            ""
        };
        Ok(OfflineResponse::new(format!(
            "Battery is at {}%{}. Network is {}.",
            battery_pct,
            charging,
            snapshot.network_quality.as_str()
        )))
    }
}

/// Answers greetings.
pub struct GreetingHandler;

impl GreetingHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreetingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineHandler for GreetingHandler {
    fn label(&self) -> IntentLabel {
        IntentLabel::Greeting
    }

    fn handle(&self, raw_text: &str) -> Result<OfflineResponse, OfflineHandlerError> {
        let lowered = raw_text.to_lowercase();
        let reply = if lowered.contains("good morning") {
            "Good morning! How can I help?"
        } else if lowered.contains("good evening") {
            "Good evening! How can I help?"
        } else if lowered.contains("hello") || lowered.contains("hey") || lowered.contains("hi") {
            "Hello! How can I help?"
        } else {
            return Err(OfflineHandlerError::CannotAnswer(
                "not a recognizable greeting".to_string(),
            ));
        };
        Ok(OfflineResponse::new(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StaticProbe;

    #[test]
    fn test_clock_handler_formats_time() {
        let response = ClockHandler::new().handle("what time is it").unwrap();
        assert!(response.text.starts_with("It's "));
        assert!(response.text.contains(':'));
    }

    #[test]
    fn test_arithmetic_symbolic() {
        let handler = ArithmeticHandler::new();
        assert_eq!(handler.handle("2 + 3").unwrap().text, "That's 5.");
        assert_eq!(handler.handle("10 - 4").unwrap().text, "That's 6.");
        assert_eq!(handler.handle("6 / 4").unwrap().text, "That's 1.50.");
    }

    #[test]
    fn test_arithmetic_spoken_operators() {
        let handler = ArithmeticHandler::new();
        assert_eq!(
            handler.handle("what is 12 plus 5").unwrap().text,
            "That's 17."
        );
        assert_eq!(
            handler.handle("3 times 4 minus 2").unwrap().text,
            "That's 10."
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let handler = ArithmeticHandler::new();
        // 2 + 3 * 4 = 14, not 20
        assert_eq!(handler.handle("2 + 3 * 4").unwrap().text, "That's 14.");
    }

    #[test]
    fn test_arithmetic_rejects_non_expressions() {
        let handler = ArithmeticHandler::new();
        assert!(matches!(
            handler.handle("what is the weather"),
            Err(OfflineHandlerError::CannotAnswer(_))
        ));
    }

    #[test]
    fn test_arithmetic_rejects_division_by_zero() {
        let handler = ArithmeticHandler::new();
        let err = handler.handle("5 / 0").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_device_info_reports_probe_state() {
        let probe = Arc::new(StaticProbe::new(
            0.62,
            true,
            crate::device::NetworkQuality::Good,
            crate::device::PerformanceTier::High,
        ));
        let response = DeviceInfoHandler::new(probe)
            .handle("how's my battery")
            .unwrap();
        assert!(response.text.contains("62%"));
        assert!(response.text.contains("charging"));
        assert!(response.text.contains("good"));
    }

    #[test]
    fn test_greeting_variants() {
        let handler = GreetingHandler::new();
        assert!(handler.handle("good morning").unwrap().text.contains("morning"));
        assert!(handler.handle("hey there").unwrap().text.contains("Hello"));
        assert!(handler.handle("launch the missiles").is_err());
    }
}
