//! Account entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AccountId, BloodType, Role, VerificationStatus};

/// A platform account (administrator, donor, or receiver).
///
/// Field ownership is strict: `verification_status`, `is_verified` and
/// `verification_date` are mutated only by the verification workflow; the
/// `totp_*` fields only by the second-factor service; `last_donation_at` and
/// `next_eligible_at` only through `record_donation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique identifier; stores compare it case-insensitively.
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub blood_type: Option<BloodType>,
    pub verification_status: VerificationStatus,
    /// True only while `verification_status` is `Approved`.
    pub is_verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub last_donation_at: Option<DateTime<Utc>>,
    /// Derived: `last_donation_at` + the fixed cooldown window.
    pub next_eligible_at: Option<DateTime<Utc>>,
    /// Base32-encoded shared secret. Present does not imply enabled.
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    /// Time step of the last accepted TOTP code. Codes at or below this step
    /// are replays and must be rejected.
    pub totp_last_step: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh, unverified account with no donation history or second factor.
    pub fn new(
        email: impl Into<String>,
        display_name: Option<String>,
        role: Role,
        password_hash: impl Into<String>,
        blood_type: Option<BloodType>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            display_name,
            role,
            password_hash: password_hash.into(),
            blood_type,
            verification_status: VerificationStatus::Unverified,
            is_verified: false,
            verification_date: None,
            last_donation_at: None,
            next_eligible_at: None,
            totp_secret: None,
            totp_enabled: false,
            totp_last_step: None,
            created_at,
        }
    }
}
