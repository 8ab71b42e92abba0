/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the peer-to-peer network.

use crate::types::data_types::ValidatorAddress;

use super::{messages::Envelope, messenger::Messenger};

/// Handle for sending and broadcasting messages through the [`Messenger`].
///
/// It can be used to send or broadcast instances of any type that implements
/// [`Into<Envelope>`].
#[derive(Clone)]
pub(crate) struct SenderHandle<M: Messenger> {
    messenger: M,
}

impl<M: Messenger> SenderHandle<M> {
    pub(crate) fn new(messenger: M) -> Self {
        Self { messenger }
    }

    pub(crate) fn send<S: Into<Envelope>>(&mut self, peer: ValidatorAddress, msg: S) -> bool {
        self.messenger.send(peer, msg.into())
    }

    pub(crate) fn broadcast<S: Into<Envelope>>(&mut self, msg: S) {
        // Best-effort: per-peer delivery outcomes are not acted upon here.
        let _ = self.messenger.broadcast(msg.into());
    }
}
