//! Password reset token entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AccountId, TokenId};

/// A single-use, time-limited credential-recovery token.
///
/// Only a deterministic digest of the token value is stored; the raw value
/// exists solely in the reset link sent to the account's mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    pub id: TokenId,
    pub account_id: AccountId,
    /// base64url-encoded SHA-256 of the raw token value.
    pub token_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// None until consumed or superseded; the transition is monotonic.
    pub used_at: Option<DateTime<Utc>>,
}

impl ResetToken {
    pub fn new(account_id: AccountId, token_digest: String, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            token_digest,
            created_at,
            expires_at,
            used_at: None,
        }
    }

    /// A token is valid iff it is unused and unexpired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}
