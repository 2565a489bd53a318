use std::sync::Arc;

use tracing::{debug, enabled, Level};

use super::guard::RingGuard;
use crate::core::config::ProbeConfig;
use crate::core::error::{LinkageError, UnavailabilityCause};
use crate::native::{MemoryAccess, NativeLayer, RingBuffer};

/// Outcome of one io_uring probe. Immutable once built.
#[derive(Debug, Clone)]
pub struct Availability {
    cause: Option<Arc<UnavailabilityCause>>,
    tcp_fastopen_client: bool,
    tcp_fastopen_server: bool,
}

impl Availability {
    fn available(tcp_fastopen_client: bool, tcp_fastopen_server: bool) -> Self {
        Self {
            cause: None,
            tcp_fastopen_client,
            tcp_fastopen_server,
        }
    }

    fn unavailable(cause: UnavailabilityCause) -> Self {
        Self {
            cause: Some(Arc::new(cause)),
            tcp_fastopen_client: false,
            tcp_fastopen_server: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.cause.is_none()
    }

    /// Fail with a [`LinkageError`] wrapping the recorded cause when io_uring is unusable
    pub fn ensure_availability(&self) -> Result<(), LinkageError> {
        match &self.cause {
            Some(cause) => Err(LinkageError::new(cause.clone())),
            None => Ok(()),
        }
    }

    pub fn unavailability_cause(&self) -> Option<&UnavailabilityCause> {
        self.cause.as_deref()
    }

    /// Client side TCP fast open (`TCP_FASTOPEN_CONNECT`) usable through io_uring
    pub fn is_tcp_fastopen_client_side_available(&self) -> bool {
        self.is_available() && self.tcp_fastopen_client
    }

    /// Server side TCP fast open (`TCP_FASTOPEN`) usable through io_uring
    pub fn is_tcp_fastopen_server_side_available(&self) -> bool {
        self.is_available() && self.tcp_fastopen_server
    }
}

/// Runs the ordered availability checks against a set of native collaborators.
pub struct Prober<'a, N, M> {
    config: &'a ProbeConfig,
    native: &'a N,
    memory: &'a M,
}

impl<'a, N, M> Prober<'a, N, M>
where
    N: NativeLayer,
    M: MemoryAccess,
{
    pub fn new(config: &'a ProbeConfig, native: &'a N, memory: &'a M) -> Self {
        Self {
            config,
            native,
            memory,
        }
    }

    /// Run every check in order, stopping at the first failure.
    pub fn probe(&self) -> Availability {
        let availability = match self.check() {
            Ok(()) => {
                let fastopen = self.native.tcp_fastopen_support();
                Availability::available(fastopen.client, fastopen.server)
            }
            Err(cause) => Availability::unavailable(cause),
        };

        match availability.unavailability_cause() {
            Some(cause) if enabled!(Level::TRACE) => {
                debug!(error = ?cause, "io_uring integration unavailable: {}", cause);
            }
            Some(cause) => debug!("io_uring integration unavailable: {}", cause),
            None => debug!(
                "io_uring integration available (tcp fastopen client: {}, server: {})",
                availability.tcp_fastopen_client, availability.tcp_fastopen_server
            ),
        }

        availability
    }

    fn check(&self) -> Result<(), UnavailabilityCause> {
        if self.config.no_native {
            return Err(UnavailabilityCause::ConfigurationRefusal);
        }

        let release = self.native.kernel_version()?;
        self.native.check_kernel_version(&release)?;

        if let Some(cause) = self.memory.unavailability_cause() {
            return Err(UnavailabilityCause::UnsupportedRuntime(cause));
        }

        self.probe_ring()
    }

    fn probe_ring(&self) -> Result<(), UnavailabilityCause> {
        let ring = RingGuard::new(self.native.create_ring_buffer()?);
        debug!("Verifying io_uring operations on probe ring (fd {})", ring.fd());
        self.native.check_all_io_supported(&ring)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::fd::RawFd;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::error::{KernelVersionError, NativeError};
    use crate::native::kernel::KernelVersion;
    use crate::native::TcpFastOpen;

    #[derive(Debug, Default)]
    pub(crate) struct Calls {
        pub kernel_version: AtomicUsize,
        pub memory: AtomicUsize,
        pub create: AtomicUsize,
        pub check_io: AtomicUsize,
        pub close: AtomicUsize,
        pub fastopen: AtomicUsize,
    }

    impl Calls {
        pub(crate) fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    pub(crate) struct MockRing {
        calls: Arc<Calls>,
        fail_close: bool,
    }

    impl RingBuffer for MockRing {
        fn fd(&self) -> RawFd {
            42
        }

        fn close(self) -> crate::Result<()> {
            self.calls.close.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(NativeError::Close {
                    fd: 42,
                    source: std::io::Error::from_raw_os_error(libc::EIO),
                });
            }
            Ok(())
        }
    }

    pub(crate) struct MockNative {
        pub calls: Arc<Calls>,
        pub release: &'static str,
        pub fail_kernel_version: bool,
        pub fail_create: bool,
        pub fail_check_io: bool,
        pub fail_close: bool,
        pub fastopen_client: bool,
        pub fastopen_server: bool,
    }

    impl Default for MockNative {
        fn default() -> Self {
            Self {
                calls: Arc::new(Calls::default()),
                release: "6.8.0-45-generic",
                fail_kernel_version: false,
                fail_create: false,
                fail_check_io: false,
                fail_close: false,
                fastopen_client: true,
                fastopen_server: false,
            }
        }
    }

    impl NativeLayer for MockNative {
        type Ring = MockRing;

        fn kernel_version(&self) -> crate::Result<String> {
            self.calls.kernel_version.fetch_add(1, Ordering::SeqCst);
            if self.fail_kernel_version {
                return Err(NativeError::IoError(std::io::Error::from_raw_os_error(
                    libc::EFAULT,
                )));
            }
            Ok(self.release.to_string())
        }

        fn check_kernel_version(&self, release: &str) -> Result<(), KernelVersionError> {
            KernelVersion::check(release).map(|_| ())
        }

        fn create_ring_buffer(&self) -> crate::Result<MockRing> {
            self.calls.create.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(NativeError::RingSetup {
                    entries: 4096,
                    source: std::io::Error::from_raw_os_error(libc::ENOMEM),
                });
            }
            Ok(MockRing {
                calls: self.calls.clone(),
                fail_close: self.fail_close,
            })
        }

        fn check_all_io_supported(&self, ring: &MockRing) -> crate::Result<()> {
            assert_eq!(ring.fd(), 42);
            self.calls.check_io.fetch_add(1, Ordering::SeqCst);
            if self.fail_check_io {
                return Err(NativeError::UnsupportedOperations {
                    missing: vec!["SENDMSG"],
                });
            }
            Ok(())
        }

        fn is_supporting_tcp_fastopen_client(&self) -> bool {
            self.fastopen_client
        }

        fn is_supporting_tcp_fastopen_server(&self) -> bool {
            self.fastopen_server
        }

        fn tcp_fastopen_support(&self) -> TcpFastOpen {
            self.calls.fastopen.fetch_add(1, Ordering::SeqCst);
            TcpFastOpen {
                client: self.fastopen_client,
                server: self.fastopen_server,
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct MockMemory {
        pub calls: Arc<Calls>,
        pub cause: Option<&'static str>,
    }

    impl MemoryAccess for MockMemory {
        fn unavailability_cause(&self) -> Option<std::io::Error> {
            self.calls.memory.fetch_add(1, Ordering::SeqCst);
            self.cause
                .map(|msg| std::io::Error::new(std::io::ErrorKind::Unsupported, msg))
        }
    }

    fn run(config: &ProbeConfig, native: &MockNative, memory: &MockMemory) -> Availability {
        Prober::new(config, native, memory).probe()
    }

    fn assert_invariants(availability: &Availability) {
        assert_eq!(
            availability.is_available(),
            availability.unavailability_cause().is_none()
        );
        assert_eq!(
            availability.is_available(),
            availability.ensure_availability().is_ok()
        );
        if availability.is_tcp_fastopen_client_side_available()
            || availability.is_tcp_fastopen_server_side_available()
        {
            assert!(availability.is_available());
        }
    }

    #[test]
    fn test_configuration_refusal_skips_everything() {
        let config = ProbeConfig {
            no_native: true,
            ..ProbeConfig::default()
        };
        let native = MockNative::default();
        let memory = MockMemory {
            calls: native.calls.clone(),
            ..MockMemory::default()
        };

        let availability = run(&config, &native, &memory);

        assert!(!availability.is_available());
        assert!(availability
            .unavailability_cause()
            .unwrap()
            .is_configuration_refusal());
        let error = availability.ensure_availability().unwrap_err();
        assert!(error.cause().is_configuration_refusal());

        assert_eq!(Calls::get(&native.calls.kernel_version), 0);
        assert_eq!(Calls::get(&native.calls.memory), 0);
        assert_eq!(Calls::get(&native.calls.create), 0);
        assert_eq!(Calls::get(&native.calls.fastopen), 0);
        assert_invariants(&availability);
    }

    #[test]
    fn test_old_kernel_is_unsupported() {
        let native = MockNative {
            release: "3.9.0",
            ..MockNative::default()
        };
        let memory = MockMemory {
            calls: native.calls.clone(),
            ..MockMemory::default()
        };

        let availability = run(&ProbeConfig::default(), &native, &memory);

        assert!(!availability.is_available());
        assert!(matches!(
            availability.unavailability_cause(),
            Some(UnavailabilityCause::UnsupportedKernelVersion(
                KernelVersionError::TooOld { .. }
            ))
        ));
        assert_eq!(Calls::get(&native.calls.memory), 0);
        assert_eq!(Calls::get(&native.calls.create), 0);
        assert!(!availability.is_tcp_fastopen_client_side_available());
        assert_eq!(Calls::get(&native.calls.fastopen), 0);
        assert_invariants(&availability);
    }

    #[test]
    fn test_kernel_query_failure_is_probe_failure() {
        let native = MockNative {
            fail_kernel_version: true,
            ..MockNative::default()
        };
        let memory = MockMemory {
            calls: native.calls.clone(),
            ..MockMemory::default()
        };

        let availability = run(&ProbeConfig::default(), &native, &memory);

        assert!(matches!(
            availability.unavailability_cause(),
            Some(UnavailabilityCause::ProbeFailure(NativeError::IoError(_)))
        ));
        let error = availability.ensure_availability().unwrap_err();
        assert!(error.cause().is_probe_failure());

        assert_eq!(Calls::get(&native.calls.kernel_version), 1);
        assert_eq!(Calls::get(&native.calls.memory), 0);
        assert_eq!(Calls::get(&native.calls.create), 0);
        assert_eq!(Calls::get(&native.calls.fastopen), 0);
        assert_invariants(&availability);
    }

    #[test]
    fn test_malformed_kernel_is_unsupported() {
        let native = MockNative {
            release: "unknown",
            ..MockNative::default()
        };
        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());

        assert!(matches!(
            availability.unavailability_cause(),
            Some(UnavailabilityCause::UnsupportedKernelVersion(
                KernelVersionError::Malformed { .. }
            ))
        ));
        assert_eq!(Calls::get(&native.calls.create), 0);
    }

    #[test]
    fn test_memory_access_cause_is_wrapped() {
        use std::error::Error as _;

        let native = MockNative::default();
        let memory = MockMemory {
            calls: native.calls.clone(),
            cause: Some("no raw memory"),
        };

        let availability = run(&ProbeConfig::default(), &native, &memory);

        let cause = availability.unavailability_cause().unwrap();
        assert!(cause.is_unsupported_runtime());
        assert_eq!(cause.source().unwrap().to_string(), "no raw memory");
        assert_eq!(Calls::get(&native.calls.kernel_version), 1);
        assert_eq!(Calls::get(&native.calls.memory), 1);
        assert_eq!(Calls::get(&native.calls.create), 0);
        assert_invariants(&availability);
    }

    #[test]
    fn test_all_checks_pass() {
        let native = MockNative {
            fastopen_client: true,
            fastopen_server: false,
            ..MockNative::default()
        };
        let memory = MockMemory {
            calls: native.calls.clone(),
            ..MockMemory::default()
        };

        let availability = run(&ProbeConfig::default(), &native, &memory);

        assert!(availability.is_available());
        assert!(availability.unavailability_cause().is_none());
        assert!(availability.ensure_availability().is_ok());
        assert!(availability.is_tcp_fastopen_client_side_available());
        assert!(!availability.is_tcp_fastopen_server_side_available());

        assert_eq!(Calls::get(&native.calls.create), 1);
        assert_eq!(Calls::get(&native.calls.check_io), 1);
        assert_eq!(Calls::get(&native.calls.close), 1);
        assert_eq!(Calls::get(&native.calls.fastopen), 1);
        assert_invariants(&availability);
    }

    #[test]
    fn test_unsupported_operations_still_close_ring() {
        let native = MockNative {
            fail_check_io: true,
            ..MockNative::default()
        };

        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());

        let cause = availability.unavailability_cause().unwrap();
        assert!(cause.is_probe_failure());
        assert!(matches!(
            cause,
            UnavailabilityCause::ProbeFailure(NativeError::UnsupportedOperations { .. })
        ));
        assert_eq!(Calls::get(&native.calls.close), 1);
        assert_eq!(Calls::get(&native.calls.fastopen), 0);
        assert!(!availability.is_tcp_fastopen_client_side_available());
        assert_invariants(&availability);
    }

    #[test]
    fn test_ring_creation_failure_has_nothing_to_close() {
        let native = MockNative {
            fail_create: true,
            ..MockNative::default()
        };

        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());

        assert!(matches!(
            availability.unavailability_cause(),
            Some(UnavailabilityCause::ProbeFailure(NativeError::RingSetup { .. }))
        ));
        assert_eq!(Calls::get(&native.calls.check_io), 0);
        assert_eq!(Calls::get(&native.calls.close), 0);
        assert_invariants(&availability);
    }

    #[test]
    fn test_close_failure_does_not_mask_result() {
        let native = MockNative {
            fail_close: true,
            ..MockNative::default()
        };
        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());
        assert!(availability.is_available());
        assert_eq!(Calls::get(&native.calls.close), 1);

        let native = MockNative {
            fail_close: true,
            fail_check_io: true,
            ..MockNative::default()
        };
        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());
        assert!(matches!(
            availability.unavailability_cause(),
            Some(UnavailabilityCause::ProbeFailure(NativeError::UnsupportedOperations { .. }))
        ));
        assert_eq!(Calls::get(&native.calls.close), 1);
    }

    #[test]
    fn test_queries_are_stable() {
        let native = MockNative {
            fastopen_server: true,
            ..MockNative::default()
        };
        let availability = run(&ProbeConfig::default(), &native, &MockMemory::default());
        let fastopen_calls = Calls::get(&native.calls.fastopen);

        for _ in 0..3 {
            assert!(availability.is_available());
            assert!(availability.is_tcp_fastopen_client_side_available());
            assert!(availability.is_tcp_fastopen_server_side_available());
        }
        assert_eq!(Calls::get(&native.calls.fastopen), fastopen_calls);
    }
}
