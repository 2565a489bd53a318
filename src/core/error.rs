use std::sync::Arc;
use thiserror::Error;

use crate::native::kernel::KernelVersion;
use crate::NO_NATIVE_ENV;

/// Errors raised by the native binding layer.
#[derive(Debug, Error)]
pub enum NativeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to create io_uring ring buffer with {entries} entries")]
    RingSetup {
        entries: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to probe io_uring opcodes")]
    OpcodeProbe(#[source] std::io::Error),

    #[error("io_uring operations not supported by this kernel: {}", .missing.join(", "))]
    UnsupportedOperations { missing: Vec<&'static str> },

    /// Only raised by bindings that observe close(2); `SystemRing` cannot
    #[error("Failed to close io_uring ring buffer (fd {fd})")]
    Close {
        fd: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("io_uring is only available on Linux")]
    UnsupportedPlatform,
}

#[derive(Debug, Error)]
pub enum KernelVersionError {
    #[error("Malformed kernel version: {release:?}")]
    Malformed { release: String },

    #[error("You need at least kernel version {required}, current kernel version: {found}")]
    TooOld {
        found: String,
        required: KernelVersion,
    },
}

/// The single reason recorded when io_uring cannot be used in this process.
#[derive(Debug, Error)]
pub enum UnavailabilityCause {
    #[error("Native transport was explicitly disabled with {}=true", NO_NATIVE_ENV)]
    ConfigurationRefusal,

    #[error("Unsupported kernel version")]
    UnsupportedKernelVersion(#[from] KernelVersionError),

    #[error("Raw memory access is not supported")]
    UnsupportedRuntime(#[source] std::io::Error),

    #[error("io_uring probe failed")]
    ProbeFailure(#[from] NativeError),
}

impl UnavailabilityCause {
    pub fn is_configuration_refusal(&self) -> bool {
        matches!(self, Self::ConfigurationRefusal)
    }

    pub fn is_unsupported_kernel_version(&self) -> bool {
        matches!(self, Self::UnsupportedKernelVersion(_))
    }

    pub fn is_unsupported_runtime(&self) -> bool {
        matches!(self, Self::UnsupportedRuntime(_))
    }

    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Self::ProbeFailure(_))
    }
}

/// Hard failure returned to callers that require io_uring.
#[derive(Debug, Clone, Error)]
#[error("failed to load the required native library")]
pub struct LinkageError {
    #[source]
    cause: Arc<UnavailabilityCause>,
}

impl LinkageError {
    pub(crate) fn new(cause: Arc<UnavailabilityCause>) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &UnavailabilityCause {
        &self.cause
    }
}
