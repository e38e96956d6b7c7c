//! Entity models for the trust core.

pub mod accounts;
pub mod challenges;
pub mod reset_tokens;
pub mod submissions;

pub use accounts::Account;
pub use challenges::LoginChallenge;
pub use reset_tokens::ResetToken;
pub use submissions::{DocumentRef, Questionnaire, ReviewDecision, VerificationSubmission};
