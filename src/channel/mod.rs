//! Transactional channel sessions the sink drains events from.

pub mod memory;

pub use memory::MemoryChannel;

use crate::error::ChannelError;
use crate::event::Event;

/// Lifecycle of a single channel transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Active,
    Committed,
    RolledBack,
    Released,
}

/// A buffered source of events that hands them out under transactions.
pub trait Channel: Send + Sync {
    /// Creates a new transaction in the [`TransactionState::Pending`] state.
    fn transaction(&self) -> Result<Box<dyn Transaction + '_>, ChannelError>;
}

/// One transaction against a [`Channel`].
///
/// Events taken under the transaction stay invisible to other takers until
/// the transaction is rolled back. A commit removes them for good.
pub trait Transaction: Send {
    fn begin(&mut self) -> Result<(), ChannelError>;

    /// Takes the next event, or `None` if the channel is empty.
    fn take(&mut self) -> Result<Option<Event>, ChannelError>;

    fn commit(&mut self) -> Result<(), ChannelError>;

    fn rollback(&mut self) -> Result<(), ChannelError>;

    /// Ends the transaction. Must be a no-op on an already released transaction.
    fn release(&mut self) -> Result<(), ChannelError>;

    fn state(&self) -> TransactionState;
}
