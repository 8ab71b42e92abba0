/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable peer-to-peer networking, and the registry that routes inbound traffic to
//! per-channel handlers.
//!
//! The messenger is a best-effort broadcast and unicast substrate: it delivers bytes and never
//! interprets them. Interpretation happens on the receive path, where the
//! [`HandlerRegistry`] picks a [`MessageHandler`] by the envelope's channel ID. The registry is
//! handed to the [poller](super::receiving::start_polling) at construction, so the messenger never
//! names the engine or any other consumer.

use std::{collections::HashMap, sync::mpsc::Receiver};

use crate::types::data_types::ValidatorAddress;

use super::messages::{ChannelId, Envelope};

/// Trait for pluggable peer-to-peer networking.
pub trait Messenger: Clone + Send + 'static {
    /// Send `envelope` to every connected peer, best-effort, without blocking on delivery.
    ///
    /// The returned channel yields one success/failure marker per delivery attempt and is bounded
    /// to the number of peers. Callers that do not care about delivery outcomes may simply drop
    /// the receiver.
    fn broadcast(&mut self, envelope: Envelope) -> Receiver<bool>;

    /// Send `envelope` to the specified peer. Returns `false` if the peer is unknown or the send
    /// fails.
    fn send(&mut self, peer: ValidatorAddress, envelope: Envelope) -> bool;

    /// Receive an envelope from any peer. Returns immediately with `None` if no envelope is
    /// available now.
    fn recv(&mut self) -> Option<(ValidatorAddress, Envelope)>;
}

/// Parses and consumes the content of envelopes received on a set of channels.
pub trait MessageHandler: Send {
    /// The channels this handler is responsible for.
    fn channel_ids(&self) -> Vec<ChannelId>;

    /// Consume the content of an envelope received on one of this handler's channels. The handler
    /// chooses the parser based on the channel it registered for; malformed content is dropped
    /// here and never reaches the subsystem behind the handler.
    fn handle(&self, origin: ValidatorAddress, channel_id: ChannelId, content: &[u8]);
}

/// The ways registering a handler can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum HandlerRegistryError {
    /// Another handler is already registered for this channel.
    DuplicateChannel(ChannelId),
}

/// Routes inbound envelopes to the [`MessageHandler`] registered for their channel ID.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ChannelId, std::sync::Arc<dyn MessageHandler + Sync>>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for every channel it names. Rejects the registration wholesale if any
    /// of the channels already has a handler.
    pub fn add_message_handler(
        &mut self,
        handler: std::sync::Arc<dyn MessageHandler + Sync>,
    ) -> Result<(), HandlerRegistryError> {
        let channel_ids = handler.channel_ids();
        for channel_id in &channel_ids {
            if self.handlers.contains_key(channel_id) {
                return Err(HandlerRegistryError::DuplicateChannel(*channel_id));
            }
        }
        for channel_id in channel_ids {
            self.handlers.insert(channel_id, handler.clone());
        }
        Ok(())
    }

    /// Route `envelope` to the handler registered for its channel. Envelopes on unregistered
    /// channels are dropped with a log line.
    pub(crate) fn route(&self, origin: ValidatorAddress, envelope: Envelope) {
        match self.handlers.get(&envelope.channel_id) {
            Some(handler) => handler.handle(origin, envelope.channel_id, &envelope.content),
            None => log::debug!(
                "dropping envelope on unregistered channel {}",
                envelope.channel_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingHandler {
        channels: Vec<ChannelId>,
        hits: Arc<AtomicUsize>,
    }

    impl MessageHandler for CountingHandler {
        fn channel_ids(&self) -> Vec<ChannelId> {
            self.channels.clone()
        }

        fn handle(&self, _: ValidatorAddress, _: ChannelId, _: &[u8]) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn registry_rejects_duplicate_channels() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();

        registry
            .add_message_handler(Arc::new(CountingHandler {
                channels: vec![1, 2],
                hits: hits.clone(),
            }))
            .unwrap();

        let result = registry.add_message_handler(Arc::new(CountingHandler {
            channels: vec![2],
            hits: hits.clone(),
        }));
        assert_eq!(result, Err(HandlerRegistryError::DuplicateChannel(2)));
    }

    #[test]
    fn routing_picks_the_handler_by_channel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        registry
            .add_message_handler(Arc::new(CountingHandler {
                channels: vec![1],
                hits: hits.clone(),
            }))
            .unwrap();

        let origin = ValidatorAddress::zero();
        registry.route(
            origin,
            Envelope {
                channel_id: 1,
                content: vec![],
            },
        );
        registry.route(
            origin,
            Envelope {
                channel_id: 9,
                content: vec![],
            },
        );
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
