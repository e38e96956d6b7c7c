//! In-memory store adapter.
//!
//! Reference implementation of the repository traits for tests and
//! single-process deployments. Accounts, submissions and challenges live in
//! concurrent maps; the reset-token table sits behind one mutex because
//! `replace_for_account` must supersede and insert in a single critical
//! section.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{Account, LoginChallenge, ResetToken, VerificationSubmission};
use crate::types::{AccountId, SubmissionId, TokenId};

use super::errors::{Result, StoreError};
use super::{AccountStore, ChallengeStore, ResetTokenStore, SubmissionStore};

#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Account>,
    submissions: DashMap<SubmissionId, VerificationSubmission>,
    tokens: Mutex<HashMap<TokenId, ResetToken>>,
    challenges: DashMap<String, LoginChallenge>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenId, ResetToken>>> {
        self.tokens.lock().map_err(|_| StoreError::Other(anyhow!("reset token table lock poisoned")))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.get(&id).map(|entry| entry.clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.clone()))
    }

    async fn create(&self, account: &Account) -> Result<()> {
        if self.get_by_email(&account.email).await?.is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: Some("accounts_email_unique".to_string()),
                message: format!("an account with identifier {} already exists", account.email),
            });
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn put(&self, account: &Account) -> Result<()> {
        match self.accounts.get_mut(&account.id) {
            Some(mut entry) => {
                *entry = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn get(&self, id: SubmissionId) -> Result<Option<VerificationSubmission>> {
        Ok(self.submissions.get(&id).map(|entry| entry.clone()))
    }

    async fn pending_for_account(&self, account_id: AccountId) -> Result<Option<VerificationSubmission>> {
        Ok(self
            .submissions
            .iter()
            .find(|entry| entry.account_id == account_id && entry.is_pending())
            .map(|entry| entry.clone()))
    }

    async fn create(&self, submission: &VerificationSubmission) -> Result<()> {
        self.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn put(&self, submission: &VerificationSubmission) -> Result<()> {
        match self.submissions.get_mut(&submission.id) {
            Some(mut entry) => {
                *entry = submission.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn remove(&self, id: SubmissionId) -> Result<()> {
        self.submissions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn get_by_digest(&self, digest: &str) -> Result<Option<ResetToken>> {
        let tokens = self.tokens()?;
        Ok(tokens.values().find(|token| token.token_digest == digest).cloned())
    }

    async fn replace_for_account(&self, account_id: AccountId, token: &ResetToken, now: DateTime<Utc>) -> Result<()> {
        let mut tokens = self.tokens()?;
        for existing in tokens.values_mut() {
            if existing.account_id == account_id && existing.used_at.is_none() {
                existing.used_at = Some(now);
            }
        }
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn put(&self, token: &ResetToken) -> Result<()> {
        let mut tokens = self.tokens()?;
        match tokens.get_mut(&token.id) {
            Some(entry) => {
                *entry = token.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn get(&self, token: &str) -> Result<Option<LoginChallenge>> {
        Ok(self.challenges.get(token).map(|entry| entry.clone()))
    }

    async fn create(&self, challenge: &LoginChallenge) -> Result<()> {
        self.challenges.insert(challenge.token.clone(), challenge.clone());
        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<()> {
        self.challenges.remove(token);
        Ok(())
    }
}
