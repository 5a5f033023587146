// Constants for the retry budget module

/// Integer multiplier that lets fractional retry percentages be expressed as
/// whole token amounts. Also the upper bound on `percent_can_retry`.
pub const SCALE_FACTOR: u64 = 1000;

/// Default lifetime of a deposit
pub const DEFAULT_TTL_MS: u64 = 10 * 1000;

/// Shortest allowed deposit lifetime
pub const MIN_TTL_MS: u64 = 1000;

/// Longest allowed deposit lifetime
pub const MAX_TTL_MS: u64 = 60 * 1000;

/// Default floor on the retry rate for the conservative budget
pub const DEFAULT_MIN_RETRIES_PER_SECOND: u32 = 10;

/// Default fraction of deposits that may be retried
pub const DEFAULT_PERCENT_CAN_RETRY: f64 = 0.2;

/// Balance always reported by the infinite budget
pub const INFINITE_BALANCE: i64 = 100;
