//! Participant Model

use crate::{
    db::schema::participants,
    encryption::{EmailCipher, EncryptionError},
};
use chrono::{DateTime, Utc};
use diesel::{deserialize::Queryable, pg::Pg, prelude::Insertable, Selectable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use waitlist_core::claims::Claims;

/// An activated candidate, as durably stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    /// Identity of the participant
    #[schema(example = "3VfHtsBKQkKr7H2jB6CMvrnKekyJjpMZJA5kaPhQwjHh")]
    pub address: String,
    /// Contact address
    #[schema(example = "john.doe@mailservice.com")]
    pub email: String,
    /// Record identifier
    #[schema(value_type = String, example = "0b9c3a5e-1c48-4f8e-9fa5-3cf1f0d1e2a4")]
    pub uuid: Uuid,
    /// Activation instant, in unix milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64, example = 1647952128425_i64)]
    pub timestamp: DateTime<Utc>,
    /// Identity of the sponsoring participant
    #[schema(example = "Akp1oyjY1VZGpsd8gwHBCkADe577eVhA4f8dASxVTm3s")]
    pub sponsor: String,
}

impl Participant {
    /// Turn verified claims into a new participant record
    pub fn new(claims: Claims, activated_at: DateTime<Utc>) -> Self {
        Self {
            address: claims.identity,
            email: claims.contact,
            uuid: Uuid::new_v4(),
            timestamp: activated_at,
            sponsor: claims.referrer,
        }
    }
}

/// A participant row, email still sealed
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(Pg))]
pub struct ParticipantRecord {
    /// Internal DB id, giving the activation order
    pub id: i32,
    /// Identity of the participant
    pub address: String,
    /// Email sealed by [`EmailCipher::seal`]
    pub email: String,
    /// Record identifier
    pub uuid: Uuid,
    /// Activation instant
    pub activated_at: DateTime<Utc>,
    /// Identity of the sponsoring participant
    pub sponsor: String,
}

impl ParticipantRecord {
    /// Open the sealed email, yielding the participant
    pub fn open(self, cipher: &EmailCipher) -> Result<Participant, EncryptionError> {
        Ok(Participant {
            email: cipher.open(&self.address, &self.email)?,
            address: self.address,
            uuid: self.uuid,
            timestamp: self.activated_at,
            sponsor: self.sponsor,
        })
    }
}

/// A participant that wasn't added to the database yet
#[derive(Debug, Insertable)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(Pg))]
pub struct NewParticipantRecord {
    /// Identity of the participant
    pub address: String,
    /// Sealed email
    pub email: String,
    /// Record identifier
    pub uuid: Uuid,
    /// Activation instant
    pub activated_at: DateTime<Utc>,
    /// Identity of the sponsoring participant
    pub sponsor: String,
}

impl NewParticipantRecord {
    /// Seal the participant's email for storage
    pub fn sealed(participant: &Participant, cipher: &EmailCipher) -> Result<Self, EncryptionError> {
        Ok(Self {
            address: participant.address.clone(),
            email: cipher.seal(&participant.address, &participant.email)?,
            uuid: participant.uuid,
            activated_at: participant.timestamp,
            sponsor: participant.sponsor.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_unix_millis() {
        let at = Utc.timestamp_millis_opt(1_647_952_128_425).unwrap();
        let participant = Participant::new(Claims::new("a", "b@c.de", "s"), at);

        let json = serde_json::to_value(&participant).unwrap();
        assert_eq!(json["timestamp"], 1_647_952_128_425_i64);
        assert_eq!(json["address"], "a");
        assert_eq!(json["sponsor"], "s");

        let parsed: Participant = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, participant);
    }

    #[test]
    fn test_record_seals_the_email() {
        let cipher = EmailCipher::new(&[3; 32]).unwrap();
        let participant = Participant::new(Claims::new("a", "b@c.de", "s"), Utc::now());

        let new = NewParticipantRecord::sealed(&participant, &cipher).unwrap();
        assert_ne!(new.email, participant.email);

        let stored = ParticipantRecord {
            id: 1,
            address: new.address,
            email: new.email,
            uuid: new.uuid,
            activated_at: new.activated_at,
            sponsor: new.sponsor,
        };
        assert_eq!(stored.open(&cipher).unwrap(), participant);
    }
}
