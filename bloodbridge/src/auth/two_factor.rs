//! Second-factor enrollment and verification.
//!
//! State machine per account: unenrolled → (enroll) enrolled-but-disabled →
//! (enable with a valid code) enrolled-and-enabled → (disable) unenrolled.
//! Disable is deliberately unconditional: losing the authenticator must not
//! lock the account out forever, so the only gate is that callers reach this
//! operation through an already-authenticated session.

use std::sync::Arc;

use serde_json::json;
use tracing::instrument;

use crate::audit::{AuditAction, AuditSink};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::models::Account;
use crate::store::AccountStore;
use crate::types::{AccountId, abbrev_uuid};

use super::totp;

#[derive(Clone)]
pub struct TwoFactor {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    issuer: String,
    digits: u32,
    step_secs: i64,
    skew: i64,
}

impl TwoFactor {
    pub fn new(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>, config: &Config) -> Self {
        Self {
            accounts,
            clock,
            audit,
            issuer: config.issuer.clone(),
            digits: config.totp.digits,
            step_secs: config.totp.step.as_secs() as i64,
            skew: config.totp.skew,
        }
    }

    /// Attach a fresh secret to the account (not yet enabled). Idempotent:
    /// an existing secret is returned unchanged.
    #[instrument(skip(self), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn enroll(&self, account_id: AccountId) -> Result<String> {
        let mut account = self.load(account_id).await?;

        if let Some(secret) = &account.totp_secret {
            return Ok(secret.clone());
        }

        let secret = totp::generate_secret();
        account.totp_secret = Some(secret.clone());
        self.accounts.put(&account).await?;

        self.audit_event(account_id, AuditAction::TwoFactorEnrolled, account_id, json!({})).await;
        Ok(secret)
    }

    /// The `otpauth://` URI for out-of-band enrollment (QR rendering is the
    /// caller's concern).
    pub async fn provisioning_uri(&self, account_id: AccountId) -> Result<String> {
        let account = self.load(account_id).await?;
        let secret = account.totp_secret.as_deref().ok_or(Error::NotEnrolled)?;

        Ok(totp::provisioning_uri(&self.issuer, &account.email, secret))
    }

    /// Check a submitted code. Fails closed: no secret, malformed input, and
    /// replayed codes all come back `false`, never an error. A success moves
    /// the account's replay watermark forward, so a code verifies once per
    /// time step.
    #[instrument(skip(self, code), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn verify(&self, account_id: AccountId, code: &str) -> Result<bool> {
        let mut account = self.load(account_id).await?;
        let Some(secret) = account.totp_secret.clone() else {
            return Ok(false);
        };

        let now = self.clock.now();
        let Some(step) = totp::verify_with_skew(&secret, code, now, self.step_secs, self.skew, self.digits) else {
            return Ok(false);
        };

        if account.totp_last_step.is_some_and(|last| step <= last) {
            tracing::debug!(account = %abbrev_uuid(&account_id), "rejected replayed TOTP code");
            return Ok(false);
        }

        account.totp_last_step = Some(step);
        self.accounts.put(&account).await?;
        Ok(true)
    }

    /// Turn the second factor on, but only when the submitted code proves the
    /// authenticator holds the secret. Returns whether it was enabled.
    #[instrument(skip(self, code), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn enable(&self, account_id: AccountId, code: &str) -> Result<bool> {
        if self.load(account_id).await?.totp_secret.is_none() {
            return Err(Error::NotEnrolled);
        }

        if !self.verify(account_id, code).await? {
            return Ok(false);
        }

        // Re-read: verify() advanced the replay watermark.
        let mut account = self.load(account_id).await?;
        account.totp_enabled = true;
        self.accounts.put(&account).await?;

        self.audit_event(account_id, AuditAction::TwoFactorEnabled, account_id, json!({})).await;
        Ok(true)
    }

    /// Clear the secret and the enabled flag unconditionally.
    #[instrument(skip(self), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn disable(&self, account_id: AccountId) -> Result<()> {
        let mut account = self.load(account_id).await?;
        account.totp_enabled = false;
        account.totp_secret = None;
        account.totp_last_step = None;
        self.accounts.put(&account).await?;

        self.audit_event(account_id, AuditAction::TwoFactorDisabled, account_id, json!({})).await;
        Ok(())
    }

    async fn load(&self, account_id: AccountId) -> Result<Account> {
        self.accounts.get(account_id).await?.ok_or_else(|| Error::NotFound {
            resource: "account",
            id: account_id.to_string(),
        })
    }

    async fn audit_event(&self, actor: AccountId, action: AuditAction, target: AccountId, details: serde_json::Value) {
        if let Err(e) = self.audit.record(actor, action, target, details).await {
            tracing::warn!(error = %e, action = %action, "failed to write audit record");
        }
    }
}
