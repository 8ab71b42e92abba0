/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The answering half of the block sync protocol, which helps peers lagging behind catch up with
//! the head of the chain.
//!
//! A peer might be lagging behind for various reasons, such as network outage, downtime, or
//! deliberate action by Byzantine proposers. The server responds to:
//! 1. Inventory requests, with the hashes of blocks it holds from a given start height (bounded by
//!    a configurable limit), and
//! 2. Block requests, with the requested block if it is in the local store.
//!
//! Requests whose chain ID does not match the local chain are ignored.

use std::{
    sync::{
        mpsc::{Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::SystemTime,
};

use crate::{
    chain::Chain,
    events::{Event, ReceiveSyncRequestEvent, SendSyncResponseEvent},
    networking::{messenger::Messenger, sending::SenderHandle},
    types::data_types::{ChainID, ValidatorAddress},
};

use super::messages::{BlockResponse, InventoryResponse, SyncRequest, SyncResponse};

/// Parameters that configure the behaviour of the [`SyncServer`]. These do not change after the
/// server starts.
#[derive(Clone)]
pub struct SyncServerConfiguration {
    /// ID of the blockchain for which the server handles sync requests.
    pub chain_id: ChainID,

    /// Maximum number of block hashes this server puts in an inventory response.
    pub inventory_limit: u32,
}

pub(crate) struct SyncServer<M: Messenger> {
    config: SyncServerConfiguration,
    chain: Arc<Chain>,
    requests: Receiver<(ValidatorAddress, SyncRequest)>,
    sender: SenderHandle<M>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<M: Messenger> SyncServer<M> {
    pub(crate) fn new(
        config: SyncServerConfiguration,
        chain: Arc<Chain>,
        requests: Receiver<(ValidatorAddress, SyncRequest)>,
        messenger: M,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            chain,
            requests,
            sender: SenderHandle::new(messenger),
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    unreachable!("the sync server's shutdown channel no longer has a sender")
                }
            }

            match self.requests.try_recv() {
                Ok((origin, request)) => self.respond(origin, request),
                Err(TryRecvError::Empty) => thread::yield_now(),
                // The poller thread shuts down after the sync server, so a disconnected request
                // channel means the node is going away.
                Err(TryRecvError::Disconnected) => return,
            }
        })
    }

    fn respond(&mut self, origin: ValidatorAddress, request: SyncRequest) {
        match request {
            SyncRequest::Inventory(inventory_request) => {
                if inventory_request.chain_id != self.config.chain_id {
                    return;
                }

                Event::ReceiveSyncRequest(ReceiveSyncRequestEvent {
                    timestamp: SystemTime::now(),
                    peer: origin,
                    start_height: inventory_request.start_height,
                    limit: inventory_request.limit,
                })
                .publish(&self.event_publisher);

                let limit = inventory_request.limit.min(self.config.inventory_limit);
                let blocks = self
                    .chain
                    .blocks_in_height_range(inventory_request.start_height, limit as u64);

                self.sender.send(
                    origin,
                    SyncResponse::Inventory(InventoryResponse {
                        blocks: blocks.clone(),
                    }),
                );

                Event::SendSyncResponse(SendSyncResponseEvent {
                    timestamp: SystemTime::now(),
                    peer: origin,
                    blocks,
                })
                .publish(&self.event_publisher);
            }
            SyncRequest::Block(block_request) => {
                if block_request.chain_id != self.config.chain_id {
                    return;
                }

                if let Some(block) = self.chain.find_block(&block_request.block) {
                    self.sender.send(
                        origin,
                        SyncResponse::Block(BlockResponse {
                            block: block.block().clone(),
                        }),
                    );

                    Event::SendSyncResponse(SendSyncResponseEvent {
                        timestamp: SystemTime::now(),
                        peer: origin,
                        blocks: vec![block_request.block],
                    })
                    .publish(&self.event_publisher);
                }
                // Unknown blocks produce no response; the requester's timeout handles it.
            }
        }
    }
}
