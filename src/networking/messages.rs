/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The message envelope, and the channel IDs that partition traffic by subsystem.
//!
//! Everything that crosses the wire is an [`Envelope`]: a channel ID plus opaque content bytes.
//! The channel ID decides which [handler](super::messenger::MessageHandler) parses the content at
//! receive time. Content is always the Borsh encoding of the corresponding message type, so
//! encodings are deterministic and hashes are stable across implementations.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    sync::messages::{SyncMessage, SyncRequest, SyncResponse},
    types::{block::Block, voting::Vote},
};

/// Identifies the subsystem an [`Envelope`] belongs to.
pub type ChannelId = u16;

/// Channel carrying [`Block`]s.
pub const CHANNEL_BLOCKS: ChannelId = 1;

/// Channel carrying [`Vote`]s.
pub const CHANNEL_VOTES: ChannelId = 2;

/// Channel carrying [`SyncMessage`]s.
pub const CHANNEL_SYNC: ChannelId = 3;

/// A unit of traffic: a channel ID and opaque content bytes.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Envelope {
    pub channel_id: ChannelId,
    pub content: Vec<u8>,
}

impl From<&Block> for Envelope {
    fn from(block: &Block) -> Envelope {
        Envelope {
            channel_id: CHANNEL_BLOCKS,
            content: block
                .try_to_vec()
                .expect("serializing a block into a Vec never fails"),
        }
    }
}

impl From<&Vote> for Envelope {
    fn from(vote: &Vote) -> Envelope {
        Envelope {
            channel_id: CHANNEL_VOTES,
            content: vote
                .try_to_vec()
                .expect("serializing a vote into a Vec never fails"),
        }
    }
}

impl From<&SyncMessage> for Envelope {
    fn from(msg: &SyncMessage) -> Envelope {
        Envelope {
            channel_id: CHANNEL_SYNC,
            content: msg
                .try_to_vec()
                .expect("serializing a sync message into a Vec never fails"),
        }
    }
}

impl From<SyncRequest> for Envelope {
    fn from(request: SyncRequest) -> Envelope {
        Envelope::from(&SyncMessage::Request(request))
    }
}

impl From<SyncResponse> for Envelope {
    fn from(response: SyncResponse) -> Envelope {
        Envelope::from(&SyncMessage::Response(response))
    }
}

/// A parsed inbound message destined for the [engine](crate::engine)'s event loop.
#[derive(Clone)]
pub enum ConsensusMessage {
    Block(Block),
    Vote(Vote),
}
