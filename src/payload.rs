//! Notification Payload Parsing
//!
//! Notifications carry a payload of the form `<routing_key>:<body>`.
//! Everything after the first `:` is the message body verbatim, including
//! any further colons.

use std::fmt;

/// Error type for malformed notification payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// No `:` separator present
    MissingSeparator,
    /// Nothing before the separator
    EmptyRoutingKey,
    /// Nothing after the separator
    EmptyBody,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::MissingSeparator => write!(f, "no ':' separator in payload"),
            PayloadError::EmptyRoutingKey => write!(f, "empty routing key"),
            PayloadError::EmptyBody => write!(f, "empty message body"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// A notification payload split into its broker routing key and message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedMessage {
    /// Broker-side address for the published message
    pub routing_key: String,
    /// Message body, published verbatim
    pub body: String,
}

impl RoutedMessage {
    /// Split a raw payload on the first `:`.
    ///
    /// Fails if the separator is absent or either side is empty; the
    /// caller discards such notifications without retry.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let (routing_key, body) = raw.split_once(':').ok_or(PayloadError::MissingSeparator)?;
        if routing_key.is_empty() {
            return Err(PayloadError::EmptyRoutingKey);
        }
        if body.is_empty() {
            return Err(PayloadError::EmptyBody);
        }
        Ok(Self {
            routing_key: routing_key.to_string(),
            body: body.to_string(),
        })
    }
}
