use super::PublishClient;
use crate::error::TransportError;
use crate::event::OutboundMessage;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Reference-counted lifecycle around a [`PublishClient`] shared by several sinks.
///
/// The first `start` starts the inner client and the `stop` that balances the
/// last outstanding `start` stops it. Calls in between only move the count.
pub struct SharedClient<C> {
    inner: C,
    holders: Mutex<usize>,
}

impl<C: PublishClient> SharedClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            holders: Mutex::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of `start` calls not yet balanced by a `stop`.
    pub fn holders(&self) -> usize {
        *self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: PublishClient> PublishClient for SharedClient<C> {
    fn start(&self) -> Result<(), TransportError> {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        if *holders == 0 {
            self.inner.start()?;
        }
        *holders += 1;
        debug!(holders = *holders, "Publish client acquired");
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        let mut holders = self.holders.lock().unwrap_or_else(PoisonError::into_inner);
        match *holders {
            0 => Ok(()),
            1 => {
                *holders = 0;
                debug!("Last holder released the publish client");
                self.inner.stop()
            }
            _ => {
                *holders -= 1;
                debug!(holders = *holders, "Publish client released");
                Ok(())
            }
        }
    }

    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.inner.send(message)
    }
}
