//! Default timeouts and retry parameters, collected in one place.

use std::time::Duration;

/// Deadline for generating one pre-parameters bundle.
pub const PRE_PARAMS_TIMEOUT: Duration = Duration::from_secs(90);

/// Bound on the pre-protocol readiness barrier.
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// First delay of the chain retry/reconnect backoff.
pub const CHAIN_BACKOFF_INITIAL: Duration = Duration::from_secs(5);

/// Ceiling of the chain retry/reconnect backoff.
pub const CHAIN_BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Attempts made before a chain submission is considered permanently failed.
pub const CHAIN_SUBMIT_ATTEMPTS: usize = 5;
