//! Second-factor login challenges.
//!
//! When a login passes the password factor on an account with the second
//! factor enabled, the session is not yet authenticated. Instead of parking a
//! "pending user" marker in ambient session state, the core issues a
//! short-lived server-held challenge record keyed by a one-time token; the
//! client presents that token together with a TOTP code to finish the login.

use std::sync::Arc;

use tracing::instrument;

use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::models::{Account, LoginChallenge};
use crate::store::{AccountStore, ChallengeStore};
use crate::types::abbrev_uuid;

use super::password;
use super::two_factor::TwoFactor;

#[derive(Clone)]
pub struct LoginChallenges {
    challenges: Arc<dyn ChallengeStore>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    two_factor: TwoFactor,
    validity: chrono::Duration,
}

impl LoginChallenges {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        two_factor: TwoFactor,
        config: &Config,
    ) -> Self {
        Self {
            challenges,
            accounts,
            clock,
            two_factor,
            validity: chrono::Duration::from_std(config.challenge.validity).unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Open a challenge for an account whose password factor just succeeded.
    /// `NotEnrolled` when the account has no enabled second factor; the
    /// caller should simply complete the login.
    #[instrument(skip(self, account), fields(account = %abbrev_uuid(&account.id)))]
    pub async fn begin(&self, account: &Account) -> Result<String> {
        if !account.totp_enabled {
            return Err(Error::NotEnrolled);
        }

        let now = self.clock.now();
        let token = password::generate_token();
        let challenge = LoginChallenge {
            token: token.clone(),
            account_id: account.id,
            created_at: now,
            expires_at: now + self.validity,
        };
        self.challenges.create(&challenge).await?;

        Ok(token)
    }

    /// Finish the second factor. On success the challenge is consumed and the
    /// authenticated account returned. Unknown, expired, and bad-code
    /// outcomes all collapse to `InvalidOrExpired`; a wrong code leaves the
    /// challenge in place so the user may retry until it expires.
    #[instrument(skip_all)]
    pub async fn complete(&self, token: &str, code: &str) -> Result<Account> {
        let challenge = self.challenges.get(token).await?.ok_or(Error::InvalidOrExpired)?;

        let now = self.clock.now();
        if challenge.is_expired(now) {
            self.challenges.remove(token).await?;
            return Err(Error::InvalidOrExpired);
        }

        let account = self
            .accounts
            .get(challenge.account_id)
            .await?
            .ok_or(Error::InvalidOrExpired)?;

        if !self.two_factor.verify(account.id, code).await? {
            return Err(Error::InvalidOrExpired);
        }

        self.challenges.remove(token).await?;

        // verify() moved the replay watermark; hand back the current record.
        self.accounts.get(account.id).await?.ok_or(Error::InvalidOrExpired)
    }
}
