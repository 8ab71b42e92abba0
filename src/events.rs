/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local node.
//!
//! ## Event enum
//!
//! Significant occurrences in the node include inserting a block, marking a block valid,
//! advancing the local commit, broadcasting a proposal, or receiving a vote. Each of these
//! corresponds to a variant of the [`Event`] enum, whose inner struct stores information
//! summarizing the occurrence, always including a timestamp of when it happened.
//!
//! ## Registering event handlers
//!
//! Library users can register event handler closures, which are called by the
//! [event bus](crate::event_bus) thread when the handler's particular event variant happens.
//! Default handlers that log events out are enabled through the node
//! [configuration](crate::node::NodeConfiguration).
//!
//! Events are always emitted **after** the corresponding occurrence is completed; for example,
//! [`InsertBlockEvent`] is only emitted after the insertion has landed in the chain store.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::{
    block::Block,
    data_types::{BlockHeight, CryptoHash, Epoch, ValidatorAddress},
    voting::Vote,
};

/// Enumerates all events emitted by the node.
pub enum Event {
    // Events that change the chain store or the engine's commit state.
    InsertBlock(InsertBlockEvent),
    ValidateBlock(ValidateBlockEvent),
    CommitBlock(CommitBlockEvent),

    // Events that involve sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),

    // Events that involve receiving a message.
    ReceiveBlock(ReceiveBlockEvent),
    ReceiveVote(ReceiveVoteEvent),

    // Other engine events.
    StartEpoch(StartEpochEvent),
    CollectCertificate(CollectCertificateEvent),

    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    ReceiveSyncRequest(ReceiveSyncRequestEvent),
    SendSyncResponse(SendSyncResponseEvent),
}

impl Event {
    /// Publish this event on the event publisher channel (if the channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A new block was inserted into the chain store (possibly as an orphan, and not yet validated).
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// A stored block passed validation and had its `valid` flag set.
pub struct ValidateBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
}

/// The local highest committed certificate advanced to a new block.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub height: BlockHeight,
}

/// The node proposed a block by broadcasting it to all peers.
pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// The node voted for a block.
pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

/// The node received a block from a peer.
pub struct ReceiveBlockEvent {
    pub timestamp: SystemTime,
    pub origin: ValidatorAddress,
    pub block: CryptoHash,
}

/// The node received a vote from a peer.
pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: ValidatorAddress,
    pub vote: Vote,
}

/// The engine entered a new epoch.
pub struct StartEpochEvent {
    pub timestamp: SystemTime,
    pub epoch: Epoch,
}

/// The vote aggregator accumulated a quorum of votes for a block.
pub struct CollectCertificateEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub epoch: Epoch,
}

/// The sync manager requested a missing block from a peer.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: ValidatorAddress,
    pub block: CryptoHash,
}

/// A previously requested block was delivered by a peer.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub peer: ValidatorAddress,
    pub block: CryptoHash,
}

/// The sync server received an inventory request from a peer.
pub struct ReceiveSyncRequestEvent {
    pub timestamp: SystemTime,
    pub peer: ValidatorAddress,
    pub start_height: BlockHeight,
    pub limit: u32,
}

/// The sync server answered a peer with block hashes or a block.
pub struct SendSyncResponseEvent {
    pub timestamp: SystemTime,
    pub peer: ValidatorAddress,
    pub blocks: Vec<CryptoHash>,
}
