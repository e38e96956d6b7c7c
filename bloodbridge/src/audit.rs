//! Structured decision records for privileged actions.
//!
//! The core emits one record per privileged mutation; storage and querying of
//! the records are external. The contract is fire-and-forget with one caveat:
//! a sink failure must never fail the operation that produced it, but it must
//! not vanish silently either; callers log it at `warn`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::types::{AccountId, abbrev_uuid};

/// Privileged actions the core reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ResetTokenIssued,
    ResetTokenConsumed,
    TwoFactorEnrolled,
    TwoFactorEnabled,
    TwoFactorDisabled,
    SubmissionCreated,
    SubmissionDecided,
    DonationRecorded,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::ResetTokenIssued => "reset_token_issued",
            AuditAction::ResetTokenConsumed => "reset_token_consumed",
            AuditAction::TwoFactorEnrolled => "two_factor_enrolled",
            AuditAction::TwoFactorEnabled => "two_factor_enabled",
            AuditAction::TwoFactorDisabled => "two_factor_disabled",
            AuditAction::SubmissionCreated => "submission_created",
            AuditAction::SubmissionDecided => "submission_decided",
            AuditAction::DonationRecorded => "donation_recorded",
        };
        write!(f, "{name}")
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, actor: AccountId, action: AuditAction, target: AccountId, details: Value) -> anyhow::Result<()>;
}

/// Default sink: emits records as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, actor: AccountId, action: AuditAction, target: AccountId, details: Value) -> anyhow::Result<()> {
        tracing::info!(
            actor = %abbrev_uuid(&actor),
            action = %action,
            target = %abbrev_uuid(&target),
            %details,
            "audit record"
        );
        Ok(())
    }
}
