/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reconciliation of the local chain with peers when the engine observes references it cannot yet
//! resolve.
//!
//! The [`SyncManager`] is the requesting half of the protocol. It is driven by the engine loop:
//! the engine [asks for missing blocks](SyncManager::request_block) when validation is blocked on
//! an unknown reference, and [ticks](SyncManager::tick) the manager so that timed-out requests are
//! reassigned. The answering half is the [server](server).
//!
//! Request discipline:
//! - A bounded set of outstanding block requests, with at most one in-flight request per missing
//!   block hash across all peers. Requests that outlive the configured timeout are reassigned to
//!   another peer.
//! - At most one in-flight inventory request per peer.
//! - Peers that time out back off exponentially (doubling per consecutive failure, capped);
//!   backed-off peers are not assigned new requests until their backoff expires.
//!
//! Delivered blocks are fed back into the engine's inbound path as ordinary blocks, so they pass
//! through exactly the same insertion and validation pipeline as gossiped blocks.

pub mod messages;

pub mod server;

use std::{
    collections::HashMap,
    sync::{
        mpsc::{Receiver, Sender, TryRecvError},
        Arc,
    },
    time::{Duration, Instant},
};

use indexmap::IndexSet;

use crate::{
    chain::Chain,
    events::{EndSyncEvent, Event, StartSyncEvent},
    networking::{
        messages::ConsensusMessage,
        messenger::Messenger,
        sending::SenderHandle,
    },
    types::data_types::{BlockHeight, ChainID, CryptoHash, ValidatorAddress},
};

use self::messages::{BlockRequest, InventoryRequest, SyncRequest, SyncResponse};

/// Immutable parameters that define the behaviour of the [`SyncManager`].
#[derive(Clone)]
pub struct SyncConfiguration {
    /// ID of the chain being synced.
    pub chain_id: ChainID,

    /// Maximum number of block requests in flight at any time.
    pub max_outstanding_requests: usize,

    /// How long to wait for a response before reassigning a request to another peer.
    pub request_timeout: Duration,

    /// Backoff after a peer's first failure; doubles per consecutive failure.
    pub backoff_base: Duration,

    /// Upper bound on a peer's backoff.
    pub backoff_cap: Duration,

    /// Maximum number of hashes requested in a single inventory request.
    pub inventory_limit: u32,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            chain_id: ChainID::new(0),
            max_outstanding_requests: 64,
            request_timeout: Duration::from_secs(4),
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(60),
            inventory_limit: 256,
        }
    }
}

pub(crate) struct SyncManager<M: Messenger> {
    config: SyncConfiguration,
    chain: Arc<Chain>,
    sender: SenderHandle<M>,
    responses: Receiver<(ValidatorAddress, SyncResponse)>,
    to_engine: Sender<(ValidatorAddress, ConsensusMessage)>,
    state: SyncState,
    event_publisher: Option<Sender<Event>>,
}

struct SyncState {
    peers: IndexSet<ValidatorAddress>,
    next_peer: usize,
    outstanding: HashMap<CryptoHash, InFlightRequest>,
    inventory_in_flight: HashMap<ValidatorAddress, Instant>,
    backoff: HashMap<ValidatorAddress, PeerBackoff>,
}

struct InFlightRequest {
    peer: ValidatorAddress,
    sent_at: Instant,
}

struct PeerBackoff {
    consecutive_failures: u32,
    retry_at: Instant,
}

impl<M: Messenger> SyncManager<M> {
    pub(crate) fn new(
        config: SyncConfiguration,
        chain: Arc<Chain>,
        sender: SenderHandle<M>,
        responses: Receiver<(ValidatorAddress, SyncResponse)>,
        to_engine: Sender<(ValidatorAddress, ConsensusMessage)>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            chain,
            sender,
            responses,
            to_engine,
            state: SyncState {
                peers: IndexSet::new(),
                next_peer: 0,
                outstanding: HashMap::new(),
                inventory_in_flight: HashMap::new(),
                backoff: HashMap::new(),
            },
            event_publisher,
        }
    }

    /// Make `peer` available for request assignment.
    pub(crate) fn register_peer(&mut self, peer: ValidatorAddress) {
        self.state.peers.insert(peer);
    }

    /// Request the block identified by `hash` from some available peer.
    ///
    /// A no-op if the block is already in the chain store, a request for it is already in flight,
    /// the outstanding set is full, or no peer is currently available.
    pub(crate) fn request_block(&mut self, hash: CryptoHash) {
        if self.chain.contains(&hash)
            || self.state.outstanding.contains_key(&hash)
            || self.state.outstanding.len() >= self.config.max_outstanding_requests
        {
            return;
        }

        let now = Instant::now();
        let peer = match self.pick_peer(now) {
            Some(peer) => peer,
            None => return,
        };

        self.send_block_request(peer, hash, now);
    }

    /// Ask `peer` for the hashes of blocks it holds above our best height. At most one inventory
    /// request per peer is in flight.
    pub(crate) fn request_inventory(&mut self, peer: ValidatorAddress, from: BlockHeight) {
        if self.state.inventory_in_flight.contains_key(&peer) || self.is_backed_off(&peer) {
            return;
        }

        let sent = self.sender.send(
            peer,
            SyncRequest::Inventory(InventoryRequest {
                chain_id: self.config.chain_id,
                start_height: from,
                limit: self.config.inventory_limit,
            }),
        );
        if sent {
            self.state.inventory_in_flight.insert(peer, Instant::now());
        } else {
            self.note_failure(peer, Instant::now());
        }
    }

    /// Drain delivered responses and reassign timed-out requests. Called by the engine loop on
    /// every iteration.
    pub(crate) fn tick(&mut self) {
        self.drain_responses();
        self.reassign_timed_out(Instant::now());
    }

    fn drain_responses(&mut self) {
        loop {
            match self.responses.try_recv() {
                Ok((origin, SyncResponse::Block(response))) => {
                    let hash = response.block.hash();
                    if let Some(in_flight) = self.state.outstanding.remove(&hash) {
                        // A useful answer clears the answering peer's backoff.
                        if in_flight.peer == origin {
                            self.state.backoff.remove(&origin);
                        }
                        Event::EndSync(EndSyncEvent {
                            timestamp: std::time::SystemTime::now(),
                            peer: origin,
                            block: hash,
                        })
                        .publish(&self.event_publisher);
                    }
                    // Delivered blocks re-enter the engine's ordinary inbound path.
                    let _ = self
                        .to_engine
                        .send((origin, ConsensusMessage::Block(response.block)));
                }
                Ok((origin, SyncResponse::Inventory(response))) => {
                    self.state.inventory_in_flight.remove(&origin);
                    self.state.backoff.remove(&origin);
                    for hash in response.blocks {
                        if !self.chain.contains(&hash) {
                            self.request_block(hash);
                        }
                    }
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn reassign_timed_out(&mut self, now: Instant) {
        let timeout = self.config.request_timeout;

        let timed_out: Vec<(CryptoHash, ValidatorAddress)> = self
            .state
            .outstanding
            .iter()
            .filter(|(_, r)| now.duration_since(r.sent_at) >= timeout)
            .map(|(hash, r)| (*hash, r.peer))
            .collect();

        for (hash, failed_peer) in timed_out {
            self.state.outstanding.remove(&hash);
            self.note_failure(failed_peer, now);

            if let Some(peer) = self.pick_peer(now) {
                self.send_block_request(peer, hash, now);
            }
        }

        let stale_inventories: Vec<ValidatorAddress> = self
            .state
            .inventory_in_flight
            .iter()
            .filter(|(_, sent_at)| now.duration_since(**sent_at) >= timeout)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in stale_inventories {
            self.state.inventory_in_flight.remove(&peer);
            self.note_failure(peer, now);
        }
    }

    fn send_block_request(&mut self, peer: ValidatorAddress, hash: CryptoHash, now: Instant) {
        let sent = self.sender.send(
            peer,
            SyncRequest::Block(BlockRequest {
                chain_id: self.config.chain_id,
                block: hash,
            }),
        );
        if sent {
            self.state
                .outstanding
                .insert(hash, InFlightRequest { peer, sent_at: now });
            Event::StartSync(StartSyncEvent {
                timestamp: std::time::SystemTime::now(),
                peer,
                block: hash,
            })
            .publish(&self.event_publisher);
        } else {
            self.note_failure(peer, now);
        }
    }

    // Round-robin over registered peers, skipping those currently backed off.
    fn pick_peer(&mut self, now: Instant) -> Option<ValidatorAddress> {
        let n = self.state.peers.len();
        for i in 0..n {
            let index = (self.state.next_peer + i) % n;
            let peer = *self.state.peers.get_index(index).unwrap();
            if !self.is_backed_off_at(&peer, now) {
                self.state.next_peer = (index + 1) % n;
                return Some(peer);
            }
        }
        None
    }

    fn is_backed_off(&self, peer: &ValidatorAddress) -> bool {
        self.is_backed_off_at(peer, Instant::now())
    }

    fn is_backed_off_at(&self, peer: &ValidatorAddress, now: Instant) -> bool {
        self.state
            .backoff
            .get(peer)
            .is_some_and(|b| b.retry_at > now)
    }

    fn note_failure(&mut self, peer: ValidatorAddress, now: Instant) {
        let backoff = self
            .state
            .backoff
            .entry(peer)
            .or_insert_with(|| PeerBackoff {
                consecutive_failures: 0,
                retry_at: now,
            });
        backoff.consecutive_failures = backoff.consecutive_failures.saturating_add(1);

        let exponent = backoff.consecutive_failures.saturating_sub(1).min(16);
        let delay = self
            .config
            .backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.config.backoff_cap);
        backoff.retry_at = now + delay;

        log::debug!(
            "sync peer backoff: {} consecutive failures, retrying in {:?}",
            backoff.consecutive_failures,
            delay
        );
    }
}
