//! Credential, second-factor, and login-challenge machinery.

pub mod challenge;
pub mod password;
pub mod totp;
pub mod two_factor;

pub use challenge::LoginChallenges;
pub use two_factor::TwoFactor;
