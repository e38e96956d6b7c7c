//! Verification submission entity: documents, questionnaire, review decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{AccountId, SubmissionId, VerificationStatus};

/// Upper bound on supporting documents per submission (identity document,
/// medical certificate, address proof).
pub const MAX_DOCUMENTS: usize = 3;

/// Opaque handle to an externally stored supporting document. The core never
/// inspects document content, it only carries the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef(pub String);

/// Fixed health-questionnaire question keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKey {
    MedicalConditions,
    RecentIllness,
    CurrentMedication,
    RecentTravel,
}

/// Health screening answers plus the donor's consent flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Questionnaire {
    pub answers: BTreeMap<QuestionKey, String>,
    pub consent: bool,
}

/// Written exactly once, when a reviewer decides the submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub reviewer_id: AccountId,
    pub decided_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// One donor identity-verification attempt.
///
/// Created in `Pending` status; decided exactly once (→ `Approved` or
/// `Rejected`) and immutable afterward. At most one `Pending` submission may
/// exist per account at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub id: SubmissionId,
    pub account_id: AccountId,
    pub submitted_at: DateTime<Utc>,
    pub status: VerificationStatus,
    pub documents: Vec<DocumentRef>,
    pub questionnaire: Questionnaire,
    pub decision: Option<ReviewDecision>,
}

impl VerificationSubmission {
    pub fn new(
        account_id: AccountId,
        documents: Vec<DocumentRef>,
        questionnaire: Questionnaire,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            submitted_at,
            status: VerificationStatus::Pending,
            documents,
            questionnaire,
            decision: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == VerificationStatus::Pending
    }
}
