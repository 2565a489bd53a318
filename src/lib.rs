pub mod core;
pub mod io;
pub mod native;

// 重新导出主要类型
pub use crate::core::config::ProbeConfig;
pub use crate::core::error::{KernelVersionError, LinkageError, NativeError, UnavailabilityCause};
pub use io::uring::{Availability, Prober};
pub use io::{
    availability, ensure_availability, is_available, is_tcp_fastopen_client_side_available,
    is_tcp_fastopen_server_side_available, unavailability_cause,
};
pub use native::kernel::{KernelVersion, MIN_KERNEL_VERSION};

// 常量定义
pub const NO_NATIVE_ENV: &str = "URING_TRANSPORT_NO_NATIVE";
pub const ENFORCE_KERNEL_VERSION_ENV: &str = "URING_TRANSPORT_ENFORCE_KERNEL_VERSION";
pub const RING_SIZE_ENV: &str = "URING_TRANSPORT_RING_SIZE";
pub const DEFAULT_RING_SIZE: u32 = 4096;

// 结果类型别名
pub type Result<T> = std::result::Result<T, NativeError>;
