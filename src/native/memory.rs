use std::ptr;

use memmap2::MmapMut;
use tracing::trace;

use super::MemoryAccess;

const FALLBACK_PAGE_SIZE: usize = 4096;
const PATTERN: u64 = 0x5a5a_a5a5_0f0f_f0f0;

/// Checks that anonymous shared pages can be mapped and accessed through raw pointers,
/// the same way the submission and completion queues are.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemoryAccess;

impl SystemMemoryAccess {
    pub fn new() -> Self {
        Self
    }

    fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    }
}

impl MemoryAccess for SystemMemoryAccess {
    fn unavailability_cause(&self) -> Option<std::io::Error> {
        let page_size = Self::page_size();
        let mut page = match MmapMut::map_anon(page_size) {
            Ok(page) => page,
            Err(e) => return Some(e),
        };

        let slot = page.as_mut_ptr().cast::<u64>();
        // SAFETY: the mapping is page aligned and at least one page long
        let read_back = unsafe {
            ptr::write_volatile(slot, PATTERN);
            ptr::read_volatile(slot)
        };

        if read_back != PATTERN {
            return Some(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!(
                    "raw memory round trip mismatch: wrote {:#x}, read {:#x}",
                    PATTERN, read_back
                ),
            ));
        }

        trace!("Raw memory access verified on a {} byte page", page_size);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_memory_access_available() {
        assert!(SystemMemoryAccess::new().unavailability_cause().is_none());
    }

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(SystemMemoryAccess::page_size().is_power_of_two());
    }
}
