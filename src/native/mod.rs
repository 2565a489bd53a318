//! Native collaborators consulted by the io_uring availability probe.
//!
//! The probe itself only sequences these calls; everything that touches the
//! kernel lives behind [`NativeLayer`], [`RingBuffer`] and [`MemoryAccess`] so
//! the pipeline can be driven by test doubles.

pub mod kernel;
pub mod memory;

#[cfg(target_os = "linux")]
pub mod linux;

use std::os::fd::RawFd;

use crate::core::error::KernelVersionError;
use crate::Result;

pub use memory::SystemMemoryAccess;

#[cfg(target_os = "linux")]
pub use linux::{SystemNative, SystemRing, REQUIRED_OPCODES, TCP_FASTOPEN_PATH};

#[cfg(not(target_os = "linux"))]
pub use unsupported::{SystemNative, SystemRing};

/// A live ring buffer instance owned by whoever created it.
pub trait RingBuffer {
    /// Raw file descriptor of the ring
    fn fd(&self) -> RawFd;

    /// Release the ring, reporting any failure from the kernel
    fn close(self) -> Result<()>;
}

/// Kernel facing operations of the io_uring binding.
pub trait NativeLayer {
    type Ring: RingBuffer;

    /// Release string of the running kernel
    fn kernel_version(&self) -> Result<String>;

    /// Fail if `release` does not meet the minimum io_uring kernel version
    fn check_kernel_version(&self, release: &str) -> std::result::Result<(), KernelVersionError>;

    fn create_ring_buffer(&self) -> Result<Self::Ring>;

    /// Fail unless every operation the transport submits is supported by `ring`
    fn check_all_io_supported(&self, ring: &Self::Ring) -> Result<()>;

    fn is_supporting_tcp_fastopen_client(&self) -> bool;

    fn is_supporting_tcp_fastopen_server(&self) -> bool;

    /// Both fast open flags taken from a single kernel query
    fn tcp_fastopen_support(&self) -> TcpFastOpen {
        TcpFastOpen {
            client: self.is_supporting_tcp_fastopen_client(),
            server: self.is_supporting_tcp_fastopen_server(),
        }
    }
}

/// TCP fast open support reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFastOpen {
    pub client: bool,
    pub server: bool,
}

/// Oracle for raw shared-memory access, which the ring queues depend on.
pub trait MemoryAccess {
    /// `None` when raw memory access works, otherwise the reason it does not
    fn unavailability_cause(&self) -> Option<std::io::Error>;
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use std::os::fd::RawFd;

    use super::{NativeLayer, RingBuffer};
    use crate::core::config::ProbeConfig;
    use crate::core::error::{KernelVersionError, NativeError};
    use crate::Result;

    /// Uninhabited: no ring can be created off Linux.
    pub enum SystemRing {}

    impl RingBuffer for SystemRing {
        fn fd(&self) -> RawFd {
            match *self {}
        }

        fn close(self) -> Result<()> {
            match self {}
        }
    }

    #[derive(Debug, Default)]
    pub struct SystemNative;

    impl SystemNative {
        pub fn new(_config: &ProbeConfig) -> Self {
            Self
        }
    }

    impl NativeLayer for SystemNative {
        type Ring = SystemRing;

        fn kernel_version(&self) -> Result<String> {
            Err(NativeError::UnsupportedPlatform)
        }

        fn check_kernel_version(&self, _release: &str) -> std::result::Result<(), KernelVersionError> {
            Ok(())
        }

        fn create_ring_buffer(&self) -> Result<SystemRing> {
            Err(NativeError::UnsupportedPlatform)
        }

        fn check_all_io_supported(&self, ring: &SystemRing) -> Result<()> {
            match *ring {}
        }

        fn is_supporting_tcp_fastopen_client(&self) -> bool {
            false
        }

        fn is_supporting_tcp_fastopen_server(&self) -> bool {
            false
        }
    }
}
