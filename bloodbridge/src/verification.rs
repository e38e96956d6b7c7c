//! Donor identity-verification workflow.
//!
//! Account-level state machine `unverified → pending → {approved, rejected}`,
//! with `rejected → pending` allowed through a fresh submission. Submissions
//! are decided exactly once and immutable afterward; conflicts are reported
//! to the caller, never coerced.

use std::sync::Arc;

use serde_json::json;
use tracing::instrument;

use crate::audit::{AuditAction, AuditSink};
use crate::clock::Clock;
use crate::email::{Notification, Notifier};
use crate::errors::{Error, Result};
use crate::models::submissions::MAX_DOCUMENTS;
use crate::models::{Account, DocumentRef, Questionnaire, ReviewDecision, VerificationSubmission};
use crate::store::{AccountStore, SubmissionStore};
use crate::types::{AccountId, Role, SubmissionId, VerificationStatus, abbrev_uuid};

/// A reviewer's verdict on a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approve,
    Reject,
}

#[derive(Clone)]
pub struct VerificationWorkflow {
    accounts: Arc<dyn AccountStore>,
    submissions: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl VerificationWorkflow {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        submissions: Arc<dyn SubmissionStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            accounts,
            submissions,
            clock,
            notifier,
            audit,
        }
    }

    /// File a new verification submission for the account.
    ///
    /// `AlreadyApproved` when the account is verified, `AlreadyPending` when a
    /// submission is still under review; a second submission must never
    /// overwrite the first. The submission insert and the account status
    /// change land as one unit: if the account write fails the submission is
    /// removed again.
    #[instrument(skip(self, documents, questionnaire), fields(account = %abbrev_uuid(&account_id)))]
    pub async fn submit(
        &self,
        account_id: AccountId,
        documents: Vec<DocumentRef>,
        questionnaire: Questionnaire,
    ) -> Result<VerificationSubmission> {
        let mut account = self.load_account(account_id).await?;

        if account.verification_status == VerificationStatus::Approved {
            return Err(Error::AlreadyApproved);
        }
        if self.submissions.pending_for_account(account_id).await?.is_some() {
            return Err(Error::AlreadyPending);
        }
        if documents.len() > MAX_DOCUMENTS {
            return Err(Error::InvalidSubmission {
                message: format!("at most {MAX_DOCUMENTS} supporting documents are accepted"),
            });
        }
        if !questionnaire.consent {
            return Err(Error::InvalidSubmission {
                message: "consent to the health screening is required".to_string(),
            });
        }

        let submission = VerificationSubmission::new(account_id, documents, questionnaire, self.clock.now());
        self.submissions.create(&submission).await?;

        account.verification_status = VerificationStatus::Pending;
        if let Err(e) = self.accounts.put(&account).await {
            // Take the submission back out so the pair lands together or not
            // at all, and the donor can simply retry.
            if let Err(rollback) = self.submissions.remove(submission.id).await {
                tracing::error!(error = %rollback, "failed to remove submission after account write failure");
            }
            return Err(e.into());
        }

        self.audit_event(
            account_id,
            AuditAction::SubmissionCreated,
            account_id,
            json!({ "submission_id": submission.id }),
        )
        .await;

        Ok(submission)
    }

    /// Decide a pending submission.
    ///
    /// The reviewer must be an administrator; the check is on the account
    /// passed in, not on ambient context. Decisions are not revisable:
    /// anything but a pending submission yields `NotPending` and leaves the
    /// stored decision untouched. The submission and account mutations are
    /// one unit; if the account write fails the pending record is restored.
    #[instrument(
        skip(self, reviewer, notes),
        fields(submission = %abbrev_uuid(&submission_id), reviewer = %abbrev_uuid(&reviewer.id))
    )]
    pub async fn decide(
        &self,
        submission_id: SubmissionId,
        reviewer: &Account,
        outcome: ReviewOutcome,
        notes: Option<String>,
    ) -> Result<VerificationSubmission> {
        if !reviewer.role.is_administrator() {
            return Err(Error::InsufficientRole {
                required: Role::Administrator,
            });
        }

        let mut submission = self.submissions.get(submission_id).await?.ok_or_else(|| Error::NotFound {
            resource: "submission",
            id: submission_id.to_string(),
        })?;
        if !submission.is_pending() {
            return Err(Error::NotPending);
        }

        let mut account = self.load_account(submission.account_id).await?;
        let now = self.clock.now();
        let pending = submission.clone();

        submission.decision = Some(ReviewDecision {
            reviewer_id: reviewer.id,
            decided_at: now,
            notes: notes.clone(),
        });
        match outcome {
            ReviewOutcome::Approve => {
                submission.status = VerificationStatus::Approved;
                account.verification_status = VerificationStatus::Approved;
                account.is_verified = true;
                account.verification_date = Some(now);
            }
            ReviewOutcome::Reject => {
                submission.status = VerificationStatus::Rejected;
                account.verification_status = VerificationStatus::Rejected;
                account.is_verified = false;
            }
        }

        self.submissions.put(&submission).await?;
        if let Err(e) = self.accounts.put(&account).await {
            // Restore the pending record so the decision can be retried; a
            // decided submission must never sit next to an un-updated account.
            if let Err(rollback) = self.submissions.put(&pending).await {
                tracing::error!(error = %rollback, "failed to restore submission after account write failure");
            }
            return Err(e.into());
        }

        self.audit_event(
            reviewer.id,
            AuditAction::SubmissionDecided,
            account.id,
            json!({ "submission_id": submission.id, "outcome": format!("{outcome:?}") }),
        )
        .await;

        // Best-effort decision notice; delivery failure never unwinds the decision.
        if let Err(e) = self
            .notifier
            .send(
                &account.email,
                Notification::VerificationDecided {
                    display_name: account.display_name.clone(),
                    approved: outcome == ReviewOutcome::Approve,
                    notes,
                },
            )
            .await
        {
            tracing::warn!(error = %e, account = %abbrev_uuid(&account.id), "failed to send verification decision email");
        }

        Ok(submission)
    }

    async fn load_account(&self, account_id: AccountId) -> Result<Account> {
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
