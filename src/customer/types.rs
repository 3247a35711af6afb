/// Customer record type definitions
///
/// Defines the persisted record shape and the registration payload accepted
/// by the API, including the payload-level validation rules.

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum name length enforced by the store
pub const MAX_NAME_LEN: usize = 50;

/// Exact phone number length enforced by the store
pub const PHONE_NUMBER_LEN: usize = 10;

/// A customer as persisted in the `customers` table
///
/// `id`, `name` and `phone_number` never change after creation. `sms_sent`
/// starts out `false` and is flipped exactly once by the notification task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Caller-assigned unique identifier
    pub id: String,
    /// Alphabetic-only display name (may be empty)
    pub name: String,
    /// Ten character phone number
    pub phone_number: String,
    /// Whether the confirmation SMS has been recorded as delivered
    pub sms_sent: bool,
}

/// Registration payload
///
/// `id` and `phone_number` are required, `name` defaults to an empty string
/// when absent or null. Any `sms_sent` value sent by a client is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCustomer {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    pub phone_number: String,
}

/// Payload problems detected before anything touches the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The body is not a JSON object of the expected shape
    #[error("{0}")]
    Malformed(String),
    /// A required field is present but empty
    #[error("field '{0}' is required")]
    MissingField(&'static str),
    /// The name contains something other than ASCII letters
    #[error("name has special characters")]
    InvalidName,
}

impl NewCustomer {
    /// Parse a raw request body
    ///
    /// Shape errors (missing fields, wrong JSON types, invalid JSON) and empty
    /// required fields are reported as distinct `ValidationError`s.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let customer: NewCustomer =
            serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if customer.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if customer.phone_number.is_empty() {
            return Err(ValidationError::MissingField("phone_number"));
        }

        Ok(customer)
    }

    /// Check the name charset
    ///
    /// Length limits are left to the store's CHECK constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_alpha(&self.name) {
            return Err(ValidationError::InvalidName);
        }
        Ok(())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// True when every character is an ASCII letter; the empty string passes
pub fn is_alpha(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphabetic())
}
