//! Login challenge entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AccountId;

/// Server-held record of a login that passed the password factor and is
/// awaiting its second factor.
///
/// Keyed by a one-time unguessable token handed to the client; replaces any
/// ambient "pending user" session state. Expired challenges are evaluated
/// lazily, there is no background sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginChallenge {
    pub token: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LoginChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
