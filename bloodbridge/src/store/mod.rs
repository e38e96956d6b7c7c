//! Storage collaborator seams.
//!
//! The core never owns persistence. Each entity gets a narrow async
//! repository trait, and every method is one atomic unit against the backing
//! store: where an operation spans several records (superseding old reset
//! tokens while inserting a new one) the *trait method* carries the whole
//! unit, so a SQL adapter can wrap it in a single transaction and the shipped
//! in-memory adapter can serialize it behind one lock.

pub mod errors;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Account, LoginChallenge, ResetToken, VerificationSubmission};
use crate::types::{AccountId, SubmissionId};
use errors::Result;

pub use memory::MemoryStore;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;

    /// Lookup by the unique email identifier; comparison is case-insensitive.
    async fn get_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Insert a new account. Identifier uniqueness is enforced here
    /// (`UniqueViolation` on a duplicate email).
    async fn create(&self, account: &Account) -> Result<()>;

    /// Replace the stored record. `NotFound` when the account does not exist.
    async fn put(&self, account: &Account) -> Result<()>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get(&self, id: SubmissionId) -> Result<Option<VerificationSubmission>>;

    /// The account's pending submission, if one exists. The workflow relies on
    /// this to enforce the at-most-one-pending invariant.
    async fn pending_for_account(&self, account_id: AccountId) -> Result<Option<VerificationSubmission>>;

    async fn create(&self, submission: &VerificationSubmission) -> Result<()>;

    async fn put(&self, submission: &VerificationSubmission) -> Result<()>;

    /// Removing an absent submission is a no-op.
    async fn remove(&self, id: SubmissionId) -> Result<()>;
}

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn get_by_digest(&self, digest: &str) -> Result<Option<ResetToken>>;

    /// Mark every not-yet-used token of the account as used at `now` and
    /// insert `token`, as one atomic unit. Two concurrent issuances must
    /// never leave two valid tokens behind; SQL adapters run both writes in
    /// one transaction.
    async fn replace_for_account(&self, account_id: AccountId, token: &ResetToken, now: DateTime<Utc>) -> Result<()>;

    /// Replace the stored record. `NotFound` when the token does not exist.
    async fn put(&self, token: &ResetToken) -> Result<()>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get(&self, token: &str) -> Result<Option<LoginChallenge>>;

    async fn create(&self, challenge: &LoginChallenge) -> Result<()>;

    /// Removing an absent challenge is a no-op.
    async fn remove(&self, token: &str) -> Result<()>;
}
