//! FIFO queue of pending acquire requests.
//!
//! # Responsibilities
//! - Hold one ticket per caller blocked in `acquire()`
//! - Hand released connections to the oldest live ticket
//! - Drop tickets on timeout, abandonment or pool close
//!
//! The queue itself never sleeps; deadlines are enforced by the waiting
//! caller with `tokio::time::timeout_at`, which then cancels its ticket.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::pool::connection::PooledConnection;

/// An outstanding acquire request.
#[derive(Debug)]
pub struct WaitTicket {
    id: u64,
    enqueued_at: Instant,
    deadline: Instant,
    sender: oneshot::Sender<PooledConnection>,
}

impl WaitTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The waiting caller went away (its acquire future was dropped).
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Ordered queue of [`WaitTicket`]s.
#[derive(Debug, Default)]
pub struct WaitQueue {
    tickets: VecDeque<WaitTicket>,
    next_id: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Append a ticket; the receiver resolves when a connection is handed over.
    pub fn enqueue(&mut self, deadline: Instant) -> (u64, oneshot::Receiver<PooledConnection>) {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.tickets.push_back(WaitTicket {
            id,
            enqueued_at: Instant::now(),
            deadline,
            sender,
        });
        (id, receiver)
    }

    /// Remove a ticket. Returns false if it was already fulfilled or rejected.
    pub fn cancel(&mut self, id: u64) -> bool {
        match self.tickets.iter().position(|t| t.id == id) {
            Some(index) => {
                self.tickets.remove(index);
                true
            }
            None => false,
        }
    }

    /// Give `connection` to the oldest ticket whose caller is still waiting.
    ///
    /// Returns how long that ticket waited, or the connection back when no
    /// live ticket remains.
    pub fn hand_off(&mut self, mut connection: PooledConnection) -> Result<Duration, PooledConnection> {
        while let Some(ticket) = self.tickets.pop_front() {
            connection.mark_in_use();
            match ticket.sender.send(connection) {
                Ok(()) => return Ok(ticket.enqueued_at.elapsed()),
                Err(returned) => {
                    tracing::trace!(ticket = ticket.id, "Skipping abandoned wait ticket");
                    connection = returned;
                }
            }
        }
        connection.mark_idle();
        Err(connection)
    }

    /// Drop tickets whose callers have gone away.
    pub fn purge_abandoned(&mut self) -> usize {
        let before = self.tickets.len();
        self.tickets.retain(|t| !t.is_abandoned());
        before - self.tickets.len()
    }

    /// Reject every ticket; waiting callers observe a closed channel.
    pub fn reject_all(&mut self) -> usize {
        let rejected = self.tickets.len();
        self.tickets.clear();
        rejected
    }
}
