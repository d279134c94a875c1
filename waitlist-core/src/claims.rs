//! Candidate claims carried by activation tokens

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// What a candidate submits when joining the waitlist.
///
/// The wire names (`address`, `email`, `sponsor`) are the ones embedded in
/// issued tokens, so changing them invalidates every token in flight.
///
/// Fields default to the empty string when missing, so that incomplete
/// requests are reported per field by [`Validate`] rather than rejected as
/// malformed JSON.
#[derive(Deserialize, Serialize, Validate, Clone, Debug, Default, PartialEq, Eq, ToSchema)]
pub struct Claims {
    /// Opaque identity of the candidate, e.g. a wallet address
    #[serde(rename = "address", default)]
    #[validate(length(min = 1, message = "address is required"))]
    #[schema(example = "3VfHtsBKQkKr7H2jB6CMvrnKekyJjpMZJA5kaPhQwjHh")]
    pub identity: String,
    /// Where the activation link is sent
    #[serde(rename = "email", default)]
    #[validate(email(message = "email must be a valid address"))]
    #[schema(example = "john.doe@mailservice.com")]
    pub contact: String,
    /// Identity of an already accepted participant sponsoring the candidate
    #[serde(rename = "sponsor", default)]
    #[validate(length(min = 1, message = "sponsor is required"))]
    #[schema(example = "Akp1oyjY1VZGpsd8gwHBCkADe577eVhA4f8dASxVTm3s")]
    pub referrer: String,
}

impl Claims {
    /// Create a new set of claims
    pub fn new(
        identity: impl Into<String>,
        contact: impl Into<String>,
        referrer: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            contact: contact.into(),
            referrer: referrer.into(),
        }
    }

    /// Whether every required field is set.
    ///
    /// This is the only structural check tokens are subjected to on
    /// extraction; format validation happens once, at registration.
    pub fn is_complete(&self) -> bool {
        !self.identity.is_empty() && !self.contact.is_empty() && !self.referrer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_valid_claims() {
        let claims = Claims::new("addr", "john.doe@mailservice.com", "sponsor");
        assert!(claims.validate().is_ok());
        assert!(claims.is_complete());
    }

    #[test]
    fn test_missing_fields_are_reported_per_field() {
        let claims: Claims = serde_json::from_str(r#"{"email":"nope"}"#).unwrap();
        let errors = claims.validate().unwrap_err();
        let fields = errors.field_errors();

        assert_eq!(fields.len(), 3);
        assert!(!claims.is_complete());
    }

    #[test]
    fn test_wire_names() {
        let claims = Claims::new("a", "b@c.de", "s");
        let json = serde_json::to_value(&claims).unwrap();

        assert_matches!(json.get("address"), Some(v) if v == "a");
        assert_matches!(json.get("email"), Some(v) if v == "b@c.de");
        assert_matches!(json.get("sponsor"), Some(v) if v == "s");
    }
}
