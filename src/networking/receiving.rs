/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the peer-to-peer network.
//!
//! The [poller](start_polling) thread pulls envelopes off the [`Messenger`](super::messenger) and
//! hands them to the [`HandlerRegistry`](super::messenger::HandlerRegistry), which picks the
//! parser by channel ID. The handlers defined here decode the content and forward the typed
//! messages into `mpsc` channels consumed by the [engine](crate::engine) loop and the
//! [sync](crate::sync) subsystem. Per-peer ordering is preserved from wire to channel; across
//! peers no ordering is assumed.

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use borsh::BorshDeserialize;

use crate::{
    sync::messages::{SyncMessage, SyncRequest, SyncResponse},
    types::{block::Block, data_types::ValidatorAddress, voting::Vote},
};

use super::{
    messages::{ChannelId, ConsensusMessage, CHANNEL_BLOCKS, CHANNEL_SYNC, CHANNEL_VOTES},
    messenger::{HandlerRegistry, MessageHandler, Messenger},
};

/// Spawn the poller thread, which polls the [`Messenger`] for envelopes and routes them through
/// the handler `registry`.
pub(crate) fn start_polling<M: Messenger>(
    mut messenger: M,
    registry: HandlerRegistry,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("the poller thread's shutdown channel was dropped while it was running")
            }
        }

        if let Some((origin, envelope)) = messenger.recv() {
            registry.route(origin, envelope);
        } else {
            thread::yield_now()
        }
    })
}

/// Decodes blocks and votes and forwards them to the engine loop.
///
/// Structurally malformed content is dropped here, before it reaches the engine.
pub(crate) struct ConsensusMessageHandler {
    pub(crate) to_engine: Sender<(ValidatorAddress, ConsensusMessage)>,
}

impl MessageHandler for ConsensusMessageHandler {
    fn channel_ids(&self) -> Vec<ChannelId> {
        vec![CHANNEL_BLOCKS, CHANNEL_VOTES]
    }

    fn handle(&self, origin: ValidatorAddress, channel_id: ChannelId, content: &[u8]) {
        let msg = match channel_id {
            CHANNEL_BLOCKS => match Block::try_from_slice(content) {
                Ok(block) => ConsensusMessage::Block(block),
                Err(_) => {
                    log::debug!("dropping malformed block");
                    return;
                }
            },
            CHANNEL_VOTES => match Vote::try_from_slice(content) {
                Ok(vote) => ConsensusMessage::Vote(vote),
                Err(_) => {
                    log::debug!("dropping malformed vote");
                    return;
                }
            },
            _ => return,
        };
        let _ = self.to_engine.send((origin, msg));
    }
}

/// Decodes sync messages, forwarding requests to the [sync server](crate::sync::server) and
/// responses to the [sync manager](crate::sync::SyncManager).
pub(crate) struct SyncMessageHandler {
    pub(crate) to_server: Sender<(ValidatorAddress, SyncRequest)>,
    pub(crate) to_client: Sender<(ValidatorAddress, SyncResponse)>,
}

impl MessageHandler for SyncMessageHandler {
    fn channel_ids(&self) -> Vec<ChannelId> {
        vec![CHANNEL_SYNC]
    }

    fn handle(&self, origin: ValidatorAddress, _channel_id: ChannelId, content: &[u8]) {
        match SyncMessage::try_from_slice(content) {
            Ok(SyncMessage::Request(request)) => {
                let _ = self.to_server.send((origin, request));
            }
            Ok(SyncMessage::Response(response)) => {
                let _ = self.to_client.send((origin, response));
            }
            Err(_) => log::debug!("dropping malformed sync message"),
        }
    }
}
