use super::{Channel, Transaction, TransactionState};
use crate::error::ChannelError;
use crate::event::Event;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Bounded in-memory channel.
///
/// Clones share the same queue, so a producer thread can `put` while a sink
/// drains through transactions.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    inner: Arc<Mutex<VecDeque<Event>>>,
    capacity: usize,
}

impl MemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    /// Appends an event to the tail of the queue.
    ///
    /// Events currently held by open transactions count against the capacity
    /// only once they are rolled back.
    pub fn put(&self, event: Event) -> Result<(), ChannelError> {
        let mut queue = lock(&self.inner)?;
        if queue.len() >= self.capacity {
            return Err(ChannelError::Full {
                capacity: self.capacity,
            });
        }
        queue.push_back(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel for MemoryChannel {
    fn transaction(&self) -> Result<Box<dyn Transaction + '_>, ChannelError> {
        Ok(Box::new(MemoryTransaction {
            queue: Arc::clone(&self.inner),
            taken: Vec::new(),
            state: TransactionState::Pending,
        }))
    }
}

struct MemoryTransaction {
    queue: Arc<Mutex<VecDeque<Event>>>,
    taken: Vec<Event>,
    state: TransactionState,
}

impl MemoryTransaction {
    fn expect_active(&self, operation: &'static str) -> Result<(), ChannelError> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(ChannelError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Puts taken events back at the head of the queue in their original order.
    fn restore(&mut self) -> Result<(), ChannelError> {
        if self.taken.is_empty() {
            return Ok(());
        }
        let mut queue = lock(&self.queue)?;
        for event in self.taken.drain(..).rev() {
            queue.push_front(event);
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn begin(&mut self) -> Result<(), ChannelError> {
        if self.state != TransactionState::Pending {
            return Err(ChannelError::InvalidState {
                operation: "begin",
                state: self.state,
            });
        }
        self.state = TransactionState::Active;
        Ok(())
    }

    fn take(&mut self) -> Result<Option<Event>, ChannelError> {
        self.expect_active("take")?;
        let event = lock(&self.queue)?.pop_front();
        if let Some(event) = &event {
            self.taken.push(event.clone());
        }
        Ok(event)
    }

    fn commit(&mut self) -> Result<(), ChannelError> {
        self.expect_active("commit")?;
        debug!(events = self.taken.len(), "Committing memory transaction");
        self.taken.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ChannelError> {
        self.expect_active("rollback")?;
        debug!(events = self.taken.len(), "Rolling back memory transaction");
        self.restore()?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    fn release(&mut self) -> Result<(), ChannelError> {
        if self.state == TransactionState::Active {
            warn!("Releasing an active transaction, returning taken events to the channel");
            self.restore()?;
        }
        self.state = TransactionState::Released;
        Ok(())
    }

    fn state(&self) -> TransactionState {
        self.state
    }
}

fn lock(queue: &Mutex<VecDeque<Event>>) -> Result<MutexGuard<'_, VecDeque<Event>>, ChannelError> {
    queue.lock().map_err(|_| ChannelError::Poisoned)
}
