//! Process-wide io_uring availability.
//!
//! The probe runs once, on the first call to any function here, and its result
//! is shared by every thread for the rest of the process.

mod guard;
pub mod uring;

use once_cell::sync::Lazy;

use crate::core::config::ProbeConfig;
use crate::core::error::{LinkageError, UnavailabilityCause};
use crate::native::{SystemMemoryAccess, SystemNative};

pub use uring::{Availability, Prober};

static AVAILABILITY: Lazy<Availability> = Lazy::new(|| {
    let config = ProbeConfig::from_env();
    let native = SystemNative::new(&config);
    let memory = SystemMemoryAccess::new();
    Prober::new(&config, &native, &memory).probe()
});

/// The memoized probe result
pub fn availability() -> &'static Availability {
    &AVAILABILITY
}

/// Check if io_uring can be used by this process
pub fn is_available() -> bool {
    AVAILABILITY.is_available()
}

/// Fail with a [`LinkageError`] carrying the recorded cause when io_uring is unavailable
pub fn ensure_availability() -> Result<(), LinkageError> {
    AVAILABILITY.ensure_availability()
}

pub fn unavailability_cause() -> Option<&'static UnavailabilityCause> {
    AVAILABILITY.unavailability_cause()
}

pub fn is_tcp_fastopen_client_side_available() -> bool {
    AVAILABILITY.is_tcp_fastopen_client_side_available()
}

pub fn is_tcp_fastopen_server_side_available() -> bool {
    AVAILABILITY.is_tcp_fastopen_server_side_available()
}
