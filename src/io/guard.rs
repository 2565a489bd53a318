use std::ops::Deref;

use tracing::trace;

use crate::native::RingBuffer;

/// Scoped owner of a probe ring: the ring is closed exactly once when the guard
/// goes out of scope, whatever path leaves the scope.
pub(crate) struct RingGuard<R: RingBuffer> {
    ring: Option<R>,
}

impl<R: RingBuffer> RingGuard<R> {
    pub(crate) fn new(ring: R) -> Self {
        Self { ring: Some(ring) }
    }
}

impl<R: RingBuffer> Deref for RingGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        // Only emptied in drop
        match &self.ring {
            Some(ring) => ring,
            None => unreachable!("ring guard used after release"),
        }
    }
}

impl<R: RingBuffer> Drop for RingGuard<R> {
    fn drop(&mut self) {
        if let Some(ring) = self.ring.take() {
            let fd = ring.fd();
            // A failed close must never replace the probe result
            if let Err(e) = ring.close() {
                trace!("Ignoring failure to close io_uring probe ring (fd {}): {}", fd, e);
            }
        }
    }
}
