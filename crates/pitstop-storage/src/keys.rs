//! Storage key constants.

/// Storage keys used by the session layer
pub struct StorageKeys;

impl StorageKeys {
    /// Whole credential record (JSON): tokens, user id, cached profile, issue time
    pub const CREDENTIALS: &'static str = "session.credentials";

    /// First-run onboarding finished for the signed-in account
    pub const ONBOARDING_COMPLETE: &'static str = "account.onboarding_complete";

    /// Vehicle garage setup finished for the signed-in account
    pub const GARAGE_SETUP_COMPLETE: &'static str = "account.garage_setup_complete";

    /// Per-account flags wiped on logout so the next login starts fresh
    pub const ACCOUNT_FLAGS: &'static [&'static str] =
        &[Self::ONBOARDING_COMPLETE, Self::GARAGE_SETUP_COMPLETE];
}
