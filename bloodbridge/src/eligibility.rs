//! Donation eligibility decisions and the post-donation cooldown.
//!
//! `can_donate` is a pure function of the account's verification and
//! donation-history fields at the evaluation instant; nothing here keeps
//! timers or background state. The cooldown is a domain constant, not
//! configuration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::instrument;

use crate::audit::{AuditAction, AuditSink};
use crate::clock::Clock;
use crate::errors::{Error, Result};
use crate::models::Account;
use crate::store::AccountStore;
use crate::types::{AccountId, VerificationStatus, abbrev_uuid};

/// Minimum interval between successive whole-blood donations.
pub const DONATION_COOLDOWN_DAYS: i64 = 56;

pub fn donation_cooldown() -> Duration {
    Duration::days(DONATION_COOLDOWN_DAYS)
}

/// Why a donation is currently denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibilityReason {
    /// Identity verification has not been approved.
    NotVerified { status: VerificationStatus },
    /// Inside the post-donation cooldown window.
    CooldownActive { remaining: Duration },
}

/// Outcome of an eligibility check. Denials are decision values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityDecision {
    Eligible,
    Ineligible(IneligibilityReason),
}

impl EligibilityDecision {
    pub fn is_eligible(&self) -> bool {
        matches!(self, EligibilityDecision::Eligible)
    }
}

/// Result of attempting to record a donation.
#[derive(Debug, Clone)]
pub enum DonationOutcome {
    /// The account with its cooldown advanced.
    Recorded(Account),
    Denied(IneligibilityReason),
}

/// Whether the account may donate at instant `now`.
///
/// Deterministic: the same (account, now) pair always yields the same
/// decision. Verification is checked before the cooldown, so an unverified
/// account inside a stale cooldown window reports `NotVerified`.
pub fn can_donate(account: &Account, now: DateTime<Utc>) -> EligibilityDecision {
    if account.verification_status != VerificationStatus::Approved || !account.is_verified {
        return EligibilityDecision::Ineligible(IneligibilityReason::NotVerified {
            status: account.verification_status,
        });
    }

    if let Some(next_eligible_at) = account.next_eligible_at {
        if now < next_eligible_at {
            return EligibilityDecision::Ineligible(IneligibilityReason::CooldownActive {
                remaining: next_eligible_at - now,
            });
        }
    }

    EligibilityDecision::Eligible
}

/// Apply the cooldown for a donation happening at `now`.
///
/// Re-checks eligibility and returns the denial rather than coercing it, so a
/// caller cannot advance the cooldown without an allow decision. Mutates
/// `last_donation_at` and `next_eligible_at` together; the pair is never
/// split.
pub fn apply_donation(account: &mut Account, now: DateTime<Utc>) -> std::result::Result<(), IneligibilityReason> {
    if let EligibilityDecision::Ineligible(reason) = can_donate(account, now) {
        return Err(reason);
    }

    account.last_donation_at = Some(now);
    account.next_eligible_at = Some(now + donation_cooldown());
    Ok(())
}

/// Eligibility evaluation and donation recording over the account store.
///
/// `record_donation` persists the cooldown advance and emits the audit record
/// as one unit; pairing it with creation of the external donation record is
/// the caller's transaction.
#[derive(Clone)]
pub struct Eligibility {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl Eligibility {
    pub fn new(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self { accounts, clock, audit }
    }

    #[instrument(skip(self), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn check(&self, account_id: AccountId) -> Result<EligibilityDecision> {
        let account = self.load(account_id).await?;
        Ok(can_donate(&account, self.clock.now()))
    }

    #[instrument(skip(self), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn record_donation(&self, account_id: AccountId) -> Result<DonationOutcome> {
        let mut account = self.load(account_id).await?;
        let now = self.clock.now();

        if let Err(reason) = apply_donation(&mut account, now) {
            return Ok(DonationOutcome::Denied(reason));
        }
        self.accounts.put(&account).await?;

        if let Err(e) = self
            .audit
            .record(
                account_id,
                AuditAction::DonationRecorded,
                account_id,
                json!({ "next_eligible_at": account.next_eligible_at }),
            )
            .await
        {
            tracing::warn!(error = %e, "failed to write audit record for donation");
        }

        Ok(DonationOutcome::Recorded(account))
    }

    async fn load(&self, account_id: AccountId) -> Result<Account> {
        self.accounts.get(account_id).await?.ok_or_else(|| Error::NotFound {
            resource: "account",
            id: account_id.to_string(),
        })
    }
}
