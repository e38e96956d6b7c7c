//! End-to-end tests over the in-memory store: full flows across services,
//! driven by a manual clock.

use chrono::Duration;

use crate::auth::totp;
use crate::clock::Clock;
use crate::eligibility::{DonationOutcome, IneligibilityReason};
use crate::email::Notification;
use crate::errors::Error;
use crate::models::DocumentRef;
use crate::store::ChallengeStore;
use crate::test_utils::{TestHarness, consenting_questionnaire};
use crate::types::VerificationStatus;
use crate::verification::ReviewOutcome;

fn documents(n: usize) -> Vec<DocumentRef> {
    (0..n).map(|i| DocumentRef(format!("uploads/id_documents/{i}.png"))).collect()
}

/// Current code for the account's enrolled secret at the harness clock.
fn current_code(harness: &TestHarness, secret: &str) -> String {
    let now = harness.clock.now();
    totp::code_at(secret, totp::time_step(now, 30), 6).unwrap()
}

mod password_reset {
    use super::*;

    #[tokio::test]
    async fn test_request_issues_token_and_sends_link() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        h.resets.request("donor@example.com").await.unwrap();

        assert_eq!(h.notifier.sent_count(), 1);
        assert_eq!(h.notifier.last_recipient().as_deref(), Some("donor@example.com"));
        let Some(Notification::PasswordReset { reset_link, valid_for, .. }) = h.notifier.last_notification() else {
            panic!("expected a password reset notification");
        };
        // The quoted lifetime is the configured one
        assert_eq!(valid_for, Duration::hours(24));
        let raw = reset_link.split("token=").nth(1).unwrap().to_string();
        assert_eq!(h.resets.validate(&raw).await.unwrap(), donor.id);
    }

    #[tokio::test]
    async fn test_request_for_unknown_identifier_is_silent() {
        let h = TestHarness::new();
        h.create_donor("donor@example.com").await;

        // Same observable outcome as the known case, and no mail
        h.resets.request("nobody@example.com").await.unwrap();
        assert_eq!(h.notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_revoke_the_token() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        h.notifier.fail_next_sends(true);
        h.resets.request("donor@example.com").await.unwrap();

        // The token was issued even though the mail bounced
        let raw = h.resets.issue(donor.id).await.unwrap();
        assert_eq!(h.resets.validate(&raw).await.unwrap(), donor.id);
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_token() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        let first = h.resets.issue(donor.id).await.unwrap();
        let second = h.resets.issue(donor.id).await.unwrap();

        assert!(matches!(h.resets.validate(&first).await, Err(Error::InvalidOrExpired)));
        assert_eq!(h.resets.validate(&second).await.unwrap(), donor.id);
    }

    #[tokio::test]
    async fn test_unknown_expired_and_used_all_look_the_same() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        // Unknown
        assert!(matches!(h.resets.validate("no-such-token").await, Err(Error::InvalidOrExpired)));

        // Used
        let used = h.resets.issue(donor.id).await.unwrap();
        h.resets.consume(&used, "CorrectHorse1!").await.unwrap();
        assert!(matches!(h.resets.validate(&used).await, Err(Error::InvalidOrExpired)));

        // Expired
        let expired = h.resets.issue(donor.id).await.unwrap();
        h.clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert!(matches!(h.resets.validate(&expired).await, Err(Error::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_consume_swaps_the_credential_once() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        let raw = h.resets.issue(donor.id).await.unwrap();
        h.resets.consume(&raw, "CorrectHorse1!").await.unwrap();

        let account = h.account(donor.id).await;
        assert_ne!(account.password_hash, donor.password_hash);
        assert!(crate::auth::password::verify_password("CorrectHorse1!", &account.password_hash).unwrap());

        // Single use
        assert!(matches!(
            h.resets.consume(&raw, "OtherPassword1!").await,
            Err(Error::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_weak_password_leaves_token_usable() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        let raw = h.resets.issue(donor.id).await.unwrap();
        assert!(matches!(
            h.resets.consume(&raw, "alllowercase1!").await,
            Err(Error::WeakPassword { .. })
        ));

        // The failed attempt consumed nothing
        h.resets.consume(&raw, "CorrectHorse1!").await.unwrap();
    }
}

mod two_factor {
    use super::*;

    #[tokio::test]
    async fn test_enroll_is_idempotent_and_enable_requires_proof() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        let secret = h.two_factor.enroll(donor.id).await.unwrap();
        assert_eq!(h.two_factor.enroll(donor.id).await.unwrap(), secret);

        // Enrolled but not yet enabled
        assert!(!h.account(donor.id).await.totp_enabled);

        // A wrong code does not enable
        assert!(!h.two_factor.enable(donor.id, "000000").await.unwrap());
        assert!(!h.account(donor.id).await.totp_enabled);

        let code = current_code(&h, &secret);
        assert!(h.two_factor.enable(donor.id, &code).await.unwrap());
        assert!(h.account(donor.id).await.totp_enabled);
    }

    #[tokio::test]
    async fn test_enable_without_enrollment_is_rejected() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        assert!(matches!(h.two_factor.enable(donor.id, "123456").await, Err(Error::NotEnrolled)));
    }

    #[tokio::test]
    async fn test_code_verifies_once_per_step() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let secret = h.two_factor.enroll(donor.id).await.unwrap();

        let code = current_code(&h, &secret);
        assert!(h.two_factor.verify(donor.id, &code).await.unwrap());
        // Replay within the same step is rejected
        assert!(!h.two_factor.verify(donor.id, &code).await.unwrap());

        // The next step's code is fresh again
        h.clock.advance(Duration::seconds(30));
        let next = current_code(&h, &secret);
        assert!(h.two_factor.verify(donor.id, &next).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_clears_everything() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let secret = h.two_factor.enroll(donor.id).await.unwrap();
        let code = current_code(&h, &secret);
        assert!(h.two_factor.enable(donor.id, &code).await.unwrap());

        h.two_factor.disable(donor.id).await.unwrap();

        let account = h.account(donor.id).await;
        assert!(!account.totp_enabled);
        assert!(account.totp_secret.is_none());
        assert!(account.totp_last_step.is_none());

        // A code from the old secret no longer verifies
        h.clock.advance(Duration::seconds(30));
        let stale = current_code(&h, &secret);
        assert!(!h.two_factor.verify(donor.id, &stale).await.unwrap());
    }

    #[tokio::test]
    async fn test_provisioning_uri_names_the_issuer() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let secret = h.two_factor.enroll(donor.id).await.unwrap();

        let uri = h.two_factor.provisioning_uri(donor.id).await.unwrap();
        assert!(uri.starts_with("otpauth://totp/BloodBridge:donor%40example.com?"));
        assert!(uri.contains(&format!("secret={secret}")));
    }
}

mod login_challenge {
    use super::*;

    async fn enabled_donor(h: &TestHarness) -> (crate::models::Account, String) {
        let donor = h.create_donor("donor@example.com").await;
        let secret = h.two_factor.enroll(donor.id).await.unwrap();
        let code = current_code(h, &secret);
        assert!(h.two_factor.enable(donor.id, &code).await.unwrap());
        (h.account(donor.id).await, secret)
    }

    #[tokio::test]
    async fn test_full_second_factor_login() {
        let h = TestHarness::new();
        let (donor, secret) = enabled_donor(&h).await;

        let token = h.challenges.begin(&donor).await.unwrap();

        // enable() consumed the current step; step forward for a fresh code
        h.clock.advance(Duration::seconds(30));
        let code = current_code(&h, &secret);
        let authenticated = h.challenges.complete(&token, &code).await.unwrap();
        assert_eq!(authenticated.id, donor.id);

        // The challenge is single-use
        assert!(matches!(h.challenges.complete(&token, &code).await, Err(Error::InvalidOrExpired)));
    }

    #[tokio::test]
    async fn test_begin_requires_an_enabled_second_factor() {
        let h = TestHarness::new();
        let donor = h.create_donor("plain@example.com").await;

        assert!(matches!(h.challenges.begin(&donor).await, Err(Error::NotEnrolled)));
    }

    #[tokio::test]
    async fn test_wrong_code_leaves_the_challenge_open() {
        let h = TestHarness::new();
        let (donor, secret) = enabled_donor(&h).await;
        let token = h.challenges.begin(&donor).await.unwrap();

        assert!(matches!(h.challenges.complete(&token, "000000").await, Err(Error::InvalidOrExpired)));
        assert!(h.store.get(&token).await.unwrap().is_some());

        // Retry with the right code succeeds
        h.clock.advance(Duration::seconds(30));
        let code = current_code(&h, &secret);
        h.challenges.complete(&token, &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_challenge_is_removed() {
        let h = TestHarness::new();
        let (donor, secret) = enabled_donor(&h).await;
        let token = h.challenges.begin(&donor).await.unwrap();

        h.clock.advance(Duration::minutes(5) + Duration::seconds(1));
        let code = current_code(&h, &secret);
        assert!(matches!(h.challenges.complete(&token, &code).await, Err(Error::InvalidOrExpired)));
        assert!(h.store.get(&token).await.unwrap().is_none());
    }
}

mod verification {
    use super::*;

    #[tokio::test]
    async fn test_submit_review_approve() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;

        let submission = h
            .verification
            .submit(donor.id, documents(2), consenting_questionnaire())
            .await
            .unwrap();
        assert_eq!(h.account(donor.id).await.verification_status, VerificationStatus::Pending);

        let decided = h
            .verification
            .decide(submission.id, &admin, ReviewOutcome::Approve, Some("all checks out".to_string()))
            .await
            .unwrap();
        assert_eq!(decided.status, VerificationStatus::Approved);
        assert_eq!(decided.decision.as_ref().unwrap().reviewer_id, admin.id);

        let account = h.account(donor.id).await;
        assert!(account.is_verified);
        assert_eq!(account.verification_status, VerificationStatus::Approved);
        assert_eq!(account.verification_date, Some(h.now()));

        // The donor was told
        assert!(matches!(
            h.notifier.last_notification(),
            Some(Notification::VerificationDecided { approved: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_second_pending_submission_is_rejected() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        assert!(matches!(
            h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await,
            Err(Error::AlreadyPending)
        ));
    }

    #[tokio::test]
    async fn test_resubmission_allowed_after_rejection_but_not_after_approval() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;

        let first = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        h.verification
            .decide(first.id, &admin, ReviewOutcome::Reject, Some("document unreadable".to_string()))
            .await
            .unwrap();
        assert_eq!(h.account(donor.id).await.verification_status, VerificationStatus::Rejected);

        let second = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        h.verification.decide(second.id, &admin, ReviewOutcome::Approve, None).await.unwrap();

        assert!(matches!(
            h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await,
            Err(Error::AlreadyApproved)
        ));
    }

    #[tokio::test]
    async fn test_decisions_are_not_revisable() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;

        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        let decided = h.verification.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap();

        let err = h
            .verification
            .decide(submission.id, &admin, ReviewOutcome::Reject, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotPending));

        // The stored decision is untouched
        use crate::store::SubmissionStore;
        let stored = SubmissionStore::get(h.store.as_ref(), submission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Approved);
        assert_eq!(stored.decision.as_ref().unwrap().decided_at, decided.decision.unwrap().decided_at);
        assert!(h.account(donor.id).await.is_verified);
    }

    #[tokio::test]
    async fn test_only_administrators_decide() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let other = h.create_donor("other@example.com").await;

        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        assert!(matches!(
            h.verification.decide(submission.id, &other, ReviewOutcome::Approve, None).await,
            Err(Error::InsufficientRole { .. })
        ));
        assert!(h.account(donor.id).await.verification_status == VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_submission_validation() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        assert!(matches!(
            h.verification.submit(donor.id, documents(4), consenting_questionnaire()).await,
            Err(Error::InvalidSubmission { .. })
        ));

        let mut no_consent = consenting_questionnaire();
        no_consent.consent = false;
        assert!(matches!(
            h.verification.submit(donor.id, documents(1), no_consent).await,
            Err(Error::InvalidSubmission { .. })
        ));

        // Neither attempt moved the account to pending
        assert_eq!(h.account(donor.id).await.verification_status, VerificationStatus::Unverified);
    }

    #[tokio::test]
    async fn test_submit_takes_the_submission_back_when_account_write_fails() {
        use std::sync::Arc;

        use crate::store::SubmissionStore;
        use crate::test_utils::FlakyAccountStore;
        use crate::verification::VerificationWorkflow;

        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;

        let flaky = Arc::new(FlakyAccountStore::new(h.store.clone()));
        let workflow = VerificationWorkflow::new(
            flaky.clone(),
            h.store.clone(),
            h.clock.clone(),
            h.notifier.clone(),
            h.audit.clone(),
        );

        flaky.fail_next_put();
        let err = workflow.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        // Neither half of the pair landed
        assert!(h.store.pending_for_account(donor.id).await.unwrap().is_none());
        assert_eq!(h.account(donor.id).await.verification_status, VerificationStatus::Unverified);

        // A retry goes through cleanly
        workflow.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        assert_eq!(h.account(donor.id).await.verification_status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn test_decide_restores_the_pending_record_when_account_write_fails() {
        use std::sync::Arc;

        use crate::store::SubmissionStore;
        use crate::test_utils::FlakyAccountStore;
        use crate::verification::VerificationWorkflow;

        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;
        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();

        let flaky = Arc::new(FlakyAccountStore::new(h.store.clone()));
        let workflow = VerificationWorkflow::new(
            flaky.clone(),
            h.store.clone(),
            h.clock.clone(),
            h.notifier.clone(),
            h.audit.clone(),
        );

        flaky.fail_next_put();
        let err = workflow.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        // The submission is still pending and undecided, the account untouched
        let stored = SubmissionStore::get(h.store.as_ref(), submission.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
        assert!(stored.decision.is_none());
        let account = h.account(donor.id).await;
        assert_eq!(account.verification_status, VerificationStatus::Pending);
        assert!(!account.is_verified);

        // The same decision can then be retried
        workflow.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap();
        assert!(h.account(donor.id).await.is_verified);
    }

    #[tokio::test]
    async fn test_decision_notification_failure_is_non_fatal() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;
        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();

        h.notifier.fail_next_sends(true);
        h.verification.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap();

        assert!(h.account(donor.id).await.is_verified);
    }
}

mod donation {
    use super::*;

    async fn approved_donor(h: &TestHarness) -> crate::models::Account {
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;
        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        h.verification.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap();
        h.account(donor.id).await
    }

    #[tokio::test]
    async fn test_verification_gates_eligibility() {
        let h = TestHarness::new();
        let donor = h.create_donor("unverified@example.com").await;

        let decision = h.eligibility.check(donor.id).await.unwrap();
        assert!(!decision.is_eligible());

        match h.eligibility.record_donation(donor.id).await.unwrap() {
            DonationOutcome::Denied(IneligibilityReason::NotVerified { status }) => {
                assert_eq!(status, VerificationStatus::Unverified);
            }
            other => panic!("expected NotVerified denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_donation_opens_the_cooldown_window() {
        let h = TestHarness::new();
        let donor = approved_donor(&h).await;

        assert!(h.eligibility.check(donor.id).await.unwrap().is_eligible());

        let donated_at = h.now();
        let DonationOutcome::Recorded(account) = h.eligibility.record_donation(donor.id).await.unwrap() else {
            panic!("expected the donation to be recorded");
        };
        assert_eq!(account.last_donation_at, Some(donated_at));
        assert_eq!(account.next_eligible_at, Some(donated_at + Duration::days(56)));

        // Immediately afterwards the donor is inside the window
        match h.eligibility.record_donation(donor.id).await.unwrap() {
            DonationOutcome::Denied(IneligibilityReason::CooldownActive { remaining }) => {
                assert_eq!(remaining, Duration::days(56));
            }
            other => panic!("expected CooldownActive denial, got {other:?}"),
        }

        // One second short of the boundary: still denied
        h.clock.advance(Duration::days(56) - Duration::seconds(1));
        assert!(!h.eligibility.check(donor.id).await.unwrap().is_eligible());

        // At the boundary: eligible again
        h.clock.advance(Duration::seconds(1));
        assert!(h.eligibility.check(donor.id).await.unwrap().is_eligible());
    }

    #[tokio::test]
    async fn test_denied_donation_does_not_advance_the_window() {
        let h = TestHarness::new();
        let donor = approved_donor(&h).await;

        h.eligibility.record_donation(donor.id).await.unwrap();
        let after_first = h.account(donor.id).await;

        h.clock.advance(Duration::days(10));
        let outcome = h.eligibility.record_donation(donor.id).await.unwrap();
        assert!(matches!(outcome, DonationOutcome::Denied(_)));

        let account = h.account(donor.id).await;
        assert_eq!(account.last_donation_at, after_first.last_donation_at);
        assert_eq!(account.next_eligible_at, after_first.next_eligible_at);
    }
}

mod audit_trail {
    use super::*;
    use crate::audit::AuditAction;

    #[tokio::test]
    async fn test_full_donor_journey_leaves_a_trail() {
        let h = TestHarness::new();
        let donor = h.create_donor("donor@example.com").await;
        let admin = h.create_admin("admin@example.com").await;

        let raw = h.resets.issue(donor.id).await.unwrap();
        h.resets.consume(&raw, "CorrectHorse1!").await.unwrap();

        let secret = h.two_factor.enroll(donor.id).await.unwrap();
        let code = current_code(&h, &secret);
        assert!(h.two_factor.enable(donor.id, &code).await.unwrap());

        let submission = h.verification.submit(donor.id, documents(1), consenting_questionnaire()).await.unwrap();
        h.verification.decide(submission.id, &admin, ReviewOutcome::Approve, None).await.unwrap();
        h.eligibility.record_donation(donor.id).await.unwrap();

        assert_eq!(
            h.audit.actions(),
            vec![
                AuditAction::ResetTokenIssued,
                AuditAction::ResetTokenConsumed,
                AuditAction::TwoFactorEnrolled,
                AuditAction::TwoFactorEnabled,
                AuditAction::SubmissionCreated,
                AuditAction::SubmissionDecided,
                AuditAction::DonationRecorded,
            ]
        );

        // The decision names the administrator, not the donor
        let records = h.audit.records.lock().unwrap();
        let (actor, _, target, _) = records.iter().find(|(_, a, _, _)| *a == AuditAction::SubmissionDecided).unwrap();
        assert_eq!(*actor, admin.id);
        assert_eq!(*target, donor.id);
    }
}
