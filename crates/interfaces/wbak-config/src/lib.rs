//! Central configuration constants for runtime limits and defaults.

/// Channel name every request is addressed to.
pub const DEFAULT_CHANNEL: &str = "android";

/// Default settle delay before a cascaded delete fires (milliseconds).
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;

/// Upper bound accepted for the settle delay. 60 s.
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;

/// Default interval of the device-presence heartbeat (seconds).
pub const DEFAULT_DEVICE_POLL_SECS: u64 = 3;

/// Default interval of the root-status heartbeat (seconds).
pub const DEFAULT_ROOT_POLL_SECS: u64 = 3;

/// Resource pulls are declared hung by the remote executor after this long. 30 min.
pub const DEFAULT_RESOURCE_TIMEOUT_SECS: u64 = 1_800;

/// Number of hex characters kept from the credential digest.
pub const PASSWORD_LEN: usize = 7;

/// Resource-archive reports are expressed in kilobytes.
pub const RESOURCE_UNIT_BYTES: u64 = 1_024;

/// Length of the random suffix in a project name.
pub const PROJECT_SUFFIX_LEN: usize = 4;

/// Convenience function to clamp a settle delay into allowed range.
pub fn clamp_settle_delay_ms(v: u64) -> u64 {
    v.min(MAX_SETTLE_DELAY_MS)
}
