//! Password-reset token lifecycle.
//!
//! Issue, validate, consume. Two disciplines run through this module:
//!
//! - *At most one usable token per account*: issuing supersedes every other
//!   still-valid token as part of the same store unit.
//! - *Anti-enumeration*: the outward "forgot password" flow behaves
//!   identically whether or not the identifier matches an account, and
//!   validation never distinguishes unknown from expired from used.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::audit::{AuditAction, AuditSink};
use crate::clock::Clock;
use crate::config::Config;
use crate::email::{Notification, Notifier};
use crate::errors::{Error, Result};
use crate::models::ResetToken;
use crate::store::{AccountStore, ResetTokenStore};
use crate::types::{AccountId, abbrev_uuid};

use crate::auth::password;

#[derive(Clone)]
pub struct PasswordResets {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn ResetTokenStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    validity: chrono::Duration,
    base_url: String,
    min_password_length: usize,
    argon2_params: password::Argon2Params,
}

impl PasswordResets {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn ResetTokenStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        config: &Config,
    ) -> Self {
        Self {
            accounts,
            tokens,
            clock,
            notifier,
            audit,
            validity: chrono::Duration::from_std(config.reset.token_validity).unwrap_or_else(|_| chrono::Duration::hours(24)),
            base_url: config.base_url.clone(),
            min_password_length: config.password.min_length,
            argon2_params: config.password.argon2_params(),
        }
    }

    /// Boundary flow for "forgot password". The observable outcome is
    /// identical for known and unknown identifiers; only storage failures
    /// surface. Notification failure does not revoke the issued token.
    #[instrument(skip_all)]
    pub async fn request(&self, email: &str) -> Result<()> {
        let Some(account) = self.accounts.get_by_email(email).await? else {
            tracing::debug!("password reset requested for unknown identifier");
            return Ok(());
        };

        let raw_token = self.issue(account.id).await?;
        let reset_link = format!("{}/reset-password?token={}", self.base_url, raw_token);

        if let Err(e) = self
            .notifier
            .send(
                &account.email,
                Notification::PasswordReset {
                    display_name: account.display_name.clone(),
                    reset_link,
                    valid_for: self.validity,
                },
            )
            .await
        {
            // Deliberate policy: the token stands even when the mail fails.
            tracing::warn!(error = %e, account = %abbrev_uuid(&account.id), "failed to send password reset email");
        }

        Ok(())
    }

    /// Issue a fresh token for the account, superseding any still-valid one.
    /// Returns the raw value for transmission; only its digest is stored.
    #[instrument(skip(self), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn issue(&self, account_id: AccountId) -> Result<String> {
        let account = self.accounts.get(account_id).await?.ok_or_else(|| Error::NotFound {
            resource: "account",
            id: account_id.to_string(),
        })?;

        let now = self.clock.now();
        let raw_token = password::generate_token();
        let token = ResetToken::new(account.id, digest(&raw_token), now, now + self.validity);

        self.tokens.replace_for_account(account.id, &token, now).await?;

        self.audit_event(account.id, AuditAction::ResetTokenIssued, json!({ "token_id": token.id })).await;
        Ok(raw_token)
    }

    /// The account a token belongs to, if it exists, is unused and unexpired.
    /// Every failure mode is the same `InvalidOrExpired`.
    #[instrument(skip_all)]
    pub async fn validate(&self, raw_token: &str) -> Result<AccountId> {
        let token = self.tokens.get_by_digest(&digest(raw_token)).await?.ok_or(Error::InvalidOrExpired)?;

        if !token.is_valid(self.clock.now()) {
            return Err(Error::InvalidOrExpired);
        }

        Ok(token.account_id)
    }

    /// Redeem a token: re-validate, enforce the password policy, then mark
    /// the token used and swap the credential hash as one unit. If the
    /// credential write fails the token is released again, so the two
    /// mutations land together or not at all.
    #[instrument(skip_all)]
    pub async fn consume(&self, raw_token: &str, new_password: &str) -> Result<()> {
        let mut token = self.tokens.get_by_digest(&digest(raw_token)).await?.ok_or(Error::InvalidOrExpired)?;

        let now = self.clock.now();
        if !token.is_valid(now) {
            return Err(Error::InvalidOrExpired);
        }

        password::validate_strength(new_password, self.min_password_length)?;

        // Account missing behind a valid token is an internal inconsistency;
        // collapse it too rather than confirming the token was real.
        let mut account = self.accounts.get(token.account_id).await?.ok_or(Error::InvalidOrExpired)?;

        let params = self.argon2_params;
        let password = new_password.to_string();
        let new_hash = tokio::task::spawn_blocking(move || password::hash_password(&password, params))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })??;

        token.used_at = Some(now);
        self.tokens.put(&token).await?;

        account.password_hash = new_hash;
        if let Err(e) = self.accounts.put(&account).await {
            // Release the token so the user can retry with the same link.
            token.used_at = None;
            if let Err(rollback) = self.tokens.put(&token).await {
                tracing::error!(error = %rollback, "failed to release reset token after credential write failure");
            }
            return Err(e.into());
        }

        self.audit_event(account.id, AuditAction::ResetTokenConsumed, json!({ "token_id": token.id })).await;
        Ok(())
    }

    async fn audit_event(&self, account_id: AccountId, action: AuditAction, details: serde_json::Value) {
        if let Err(e) = self.audit.record(account_id, action, account_id, details).await {
            tracing::warn!(error = %e, action = %action, "failed to write audit record");
        }
    }
}

/// Deterministic digest of a raw token value: base64url-encoded SHA-256.
/// Deterministic so the store can look tokens up by value; the raw value
/// itself never touches the store.
fn digest(raw_token: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(raw_token.as_bytes()))
}
