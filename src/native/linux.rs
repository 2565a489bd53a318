use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use io_uring::{opcode, IoUring, Probe};
use tracing::{debug, trace};

use super::kernel::KernelVersion;
use super::{NativeLayer, RingBuffer, TcpFastOpen};
use crate::core::config::ProbeConfig;
use crate::core::error::{KernelVersionError, NativeError};
use crate::Result;

/// Operations the transport submits; all must be reported by `IORING_REGISTER_PROBE`.
pub const REQUIRED_OPCODES: &[(u8, &str)] = &[
    (opcode::Read::CODE, "READ"),
    (opcode::Write::CODE, "WRITE"),
    (opcode::Readv::CODE, "READV"),
    (opcode::Writev::CODE, "WRITEV"),
    (opcode::Accept::CODE, "ACCEPT"),
    (opcode::Connect::CODE, "CONNECT"),
    (opcode::Close::CODE, "CLOSE"),
    (opcode::PollAdd::CODE, "POLL_ADD"),
    (opcode::PollRemove::CODE, "POLL_REMOVE"),
    (opcode::SendMsg::CODE, "SENDMSG"),
    (opcode::RecvMsg::CODE, "RECVMSG"),
    (opcode::Timeout::CODE, "TIMEOUT"),
    (opcode::TimeoutRemove::CODE, "TIMEOUT_REMOVE"),
    (opcode::AsyncCancel::CODE, "ASYNC_CANCEL"),
];

/// sysctl bitmask: 0x1 enables client side, 0x2 server side fast open.
pub const TCP_FASTOPEN_PATH: &str = "/proc/sys/net/ipv4/tcp_fastopen";

const TFO_CLIENT_ENABLE: u32 = 0x1;
const TFO_SERVER_ENABLE: u32 = 0x2;

/// Ring created through the `io-uring` crate.
pub struct SystemRing {
    ring: IoUring,
}

impl RingBuffer for SystemRing {
    fn fd(&self) -> RawFd {
        self.ring.as_raw_fd()
    }

    fn close(self) -> Result<()> {
        // Dropping unmaps the queues and closes the descriptor; io-uring discards
        // close(2) errors there, so this binding never reports NativeError::Close
        let fd = self.fd();
        drop(self.ring);
        trace!("Closed io_uring probe ring (fd {})", fd);
        Ok(())
    }
}

/// io_uring binding backed by the running Linux kernel.
#[derive(Debug, Clone)]
pub struct SystemNative {
    ring_size: u32,
    enforce_kernel_version: bool,
    tcp_fastopen_path: PathBuf,
}

impl SystemNative {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ring_size: config.ring_size,
            enforce_kernel_version: config.enforce_kernel_version,
            tcp_fastopen_path: PathBuf::from(TCP_FASTOPEN_PATH),
        }
    }

    /// Read the fast open sysctl from somewhere other than procfs
    pub fn with_tcp_fastopen_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tcp_fastopen_path = path.into();
        self
    }

    fn tcp_fastopen_mode(&self) -> u32 {
        read_tcp_fastopen_mode(&self.tcp_fastopen_path).unwrap_or(0)
    }
}

fn tcp_fastopen_from_mode(mode: u32) -> TcpFastOpen {
    TcpFastOpen {
        client: mode & TFO_CLIENT_ENABLE != 0,
        server: mode & TFO_SERVER_ENABLE != 0,
    }
}

fn read_tcp_fastopen_mode(path: &Path) -> Option<u32> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.trim().parse().ok(),
        Err(e) => {
            debug!("Unable to read {}: {}", path.display(), e);
            None
        }
    }
}

impl NativeLayer for SystemNative {
    type Ring = SystemRing;

    fn kernel_version(&self) -> Result<String> {
        let uname = nix::sys::utsname::uname()
            .map_err(|e| NativeError::IoError(std::io::Error::from(e)))?;
        Ok(uname.release().to_string_lossy().into_owned())
    }

    fn check_kernel_version(&self, release: &str) -> std::result::Result<(), KernelVersionError> {
        match KernelVersion::check(release) {
            Ok(version) => {
                debug!("Kernel version {} supports io_uring", version);
                Ok(())
            }
            Err(e) if !self.enforce_kernel_version => {
                debug!("Ignoring kernel version check: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn create_ring_buffer(&self) -> Result<SystemRing> {
        let ring = IoUring::new(self.ring_size).map_err(|source| NativeError::RingSetup {
            entries: self.ring_size,
            source,
        })?;
        debug!(
            "Created io_uring probe ring with {} entries (fd {})",
            self.ring_size,
            ring.as_raw_fd()
        );
        Ok(SystemRing { ring })
    }

    fn check_all_io_supported(&self, ring: &SystemRing) -> Result<()> {
        let mut probe = Probe::new();
        ring.ring
            .submitter()
            .register_probe(&mut probe)
            .map_err(NativeError::OpcodeProbe)?;

        let missing: Vec<&'static str> = REQUIRED_OPCODES
            .iter()
            .filter(|(code, _)| !probe.is_supported(*code))
            .map(|(_, name)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(NativeError::UnsupportedOperations { missing });
        }
        Ok(())
    }

    fn is_supporting_tcp_fastopen_client(&self) -> bool {
        self.tcp_fastopen_support().client
    }

    fn is_supporting_tcp_fastopen_server(&self) -> bool {
        self.tcp_fastopen_support().server
    }

    fn tcp_fastopen_support(&self) -> TcpFastOpen {
        tcp_fastopen_from_mode(self.tcp_fastopen_mode())
    }
}
