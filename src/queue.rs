use std::collections::VecDeque;

use crate::events::{ClientId, SimTime};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Waiting {
    client: ClientId,
    arrival: SimTime,
    transferred: bool,
}

/// Shared FIFO of clients waiting for a counsellor.
#[derive(Clone, Debug, Default)]
pub struct WaitingRoom {
    entries: VecDeque<Waiting>,
    max_len: usize,
}

impl WaitingRoom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn push_back(&mut self, client: ClientId, arrival: SimTime) {
        self.entries.push_back(Waiting {
            client,
            arrival,
            transferred: false,
        });
        self.max_len = self.max_len.max(self.entries.len());
    }

    /// Returns a preempted client to the front of the queue. Clients handed
    /// back at the same time keep their arrival order among themselves.
    pub fn requeue_front(&mut self, client: ClientId, arrival: SimTime) {
        let position = self
            .entries
            .iter()
            .take_while(|entry| entry.transferred && entry.arrival <= arrival)
            .count();
        self.entries.insert(
            position,
            Waiting {
                client,
                arrival,
                transferred: true,
            },
        );
        self.max_len = self.max_len.max(self.entries.len());
    }

    /// Removes and returns the longest-waiting client accepted by `eligible`.
    pub fn take_first<F>(&mut self, mut eligible: F) -> Option<ClientId>
    where
        F: FnMut(ClientId) -> bool,
    {
        let position = self.entries.iter().position(|entry| eligible(entry.client))?;
        self.entries.remove(position).map(|entry| entry.client)
    }

    pub fn remove(&mut self, client: ClientId) -> bool {
        match self.entries.iter().position(|entry| entry.client == client) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.entries.iter().map(|entry| entry.client)
    }
}
