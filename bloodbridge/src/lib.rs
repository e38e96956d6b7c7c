//! # bloodbridge: Trust and Eligibility Engine for Blood Donation
//!
//! `bloodbridge` is the trust core of a blood-donation platform. It owns the
//! account-safety and medical-gating decisions the surrounding application
//! must not get wrong: second-factor authentication, the password-reset token
//! lifecycle, the donor identity-verification workflow, and the donation
//! eligibility rules with their mandatory recovery cooldown.
//!
//! ## Overview
//!
//! A donation platform connects donors, recipients, and the staff who vet
//! them. The stakes are unusual for a web product: an unverified donor must
//! never be matched to a request, and a verified donor must never be allowed
//! to donate again before the 56-day recovery window has elapsed. This crate
//! concentrates those rules in one place so the outer application (HTTP
//! handlers, templating, persistence) can stay thin.
//!
//! ### What It Does
//!
//! Accounts can enroll a TOTP second factor ([`auth::TwoFactor`]); logins on
//! enabled accounts go through a short-lived challenge record
//! ([`auth::LoginChallenges`]) instead of ambient session state. Forgotten
//! passwords are handled by single-use, digest-at-rest reset tokens with an
//! at-most-one-usable-token-per-account discipline ([`reset::PasswordResets`]).
//! Donors apply for verification with documents and a health questionnaire,
//! and administrators decide each submission exactly once
//! ([`verification::VerificationWorkflow`]). Eligibility is a pure function of
//! the account record and the evaluation instant ([`eligibility::can_donate`]),
//! and recording a donation advances the cooldown atomically
//! ([`eligibility::Eligibility`]). Security-relevant transitions are emitted
//! to an [`audit::AuditSink`].
//!
//! ## Architecture
//!
//! Persistence, outbound email, time, and audit are collaborators behind
//! traits ([`store::AccountStore`] and friends, [`email::Notifier`],
//! [`clock::Clock`], [`audit::AuditSink`]). The crate ships in-memory stores
//! ([`store::MemoryStore`]), a manual clock for tests, a lettre-backed
//! notifier, and a tracing-backed audit sink; a deployment substitutes its
//! own implementations without touching the domain logic.

pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod email;
pub mod errors;
pub mod models;
pub mod reset;
pub mod store;
pub mod types;
pub mod verification;

#[cfg(test)]
mod test;

pub use config::Config;
pub use errors::{Error, Result};
pub use types::{AccountId, BloodType, Role, SubmissionId, TokenId, VerificationStatus};
