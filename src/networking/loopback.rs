/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-process [`Messenger`] implementation connecting a fixed set of peers through bounded
//! channels.
//!
//! Used by the integration tests and by in-process simulations. The implementation demonstrates
//! the delivery discipline expected of production messengers:
//! - Broadcast is a parallel fan-out, one pool task per peer, with the completion channel bounded
//!   to the peer count.
//! - Per-peer inboxes are bounded. When an inbox is saturated, vote traffic is dropped first,
//!   while block and sync traffic blocks the sender (peer-side flow control rather than drop).
//!
//! # Limitations
//!
//! The set of peers reachable from a given `LoopbackMessenger` is fixed at
//! [construction](loopback_network). Tests that exercise validator-set changes must plan ahead and
//! create the network with the full set of addresses involved.

use std::sync::{
    mpsc::{self, Receiver, SyncSender, TrySendError},
    Arc, Mutex,
};

use indexmap::IndexMap;
use threadpool::ThreadPool;

use crate::types::data_types::ValidatorAddress;

use super::{
    messages::{Envelope, CHANNEL_VOTES},
    messenger::Messenger,
};

/// How many envelopes a peer's inbox holds before backpressure sets in.
const INBOX_CAPACITY: usize = 1024;

/// A messenger that passes envelopes to and from in-process peers using channels.
#[derive(Clone)]
pub struct LoopbackMessenger {
    my_address: ValidatorAddress,
    all_peers: Arc<IndexMap<ValidatorAddress, SyncSender<(ValidatorAddress, Envelope)>>>,
    inbox: Arc<Mutex<Receiver<(ValidatorAddress, Envelope)>>>,
    pool: ThreadPool,
}

impl Messenger for LoopbackMessenger {
    fn broadcast(&mut self, envelope: Envelope) -> Receiver<bool> {
        let (completions, completion_receiver) = mpsc::sync_channel(self.all_peers.len());
        for (_, peer_inbox) in self.all_peers.iter() {
            let peer_inbox = peer_inbox.clone();
            let my_address = self.my_address;
            let envelope = envelope.clone();
            let completions = completions.clone();
            self.pool.execute(move || {
                let delivered = deliver(&peer_inbox, my_address, envelope);
                let _ = completions.send(delivered);
            });
        }
        completion_receiver
    }

    fn send(&mut self, peer: ValidatorAddress, envelope: Envelope) -> bool {
        match self.all_peers.get(&peer) {
            Some(peer_inbox) => deliver(peer_inbox, self.my_address, envelope),
            None => false,
        }
    }

    fn recv(&mut self) -> Option<(ValidatorAddress, Envelope)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(received) => Some(received),
            Err(mpsc::TryRecvError::Empty) => None,
            // A peer that has shut down stops receiving; its inbox sender side may be gone.
            Err(mpsc::TryRecvError::Disconnected) => None,
        }
    }
}

fn deliver(
    peer_inbox: &SyncSender<(ValidatorAddress, Envelope)>,
    origin: ValidatorAddress,
    envelope: Envelope,
) -> bool {
    if envelope.channel_id == CHANNEL_VOTES {
        // Votes are the lowest-priority gossip: dropped when the inbox is saturated.
        match peer_inbox.try_send((origin, envelope)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    } else {
        peer_inbox.send((origin, envelope)).is_ok()
    }
}

/// Create a vector of [`LoopbackMessenger`]s, connecting the provided set of `peers`.
///
/// Messengers feature in the returned vector in the same order as the provided `peers`, i.e., the
/// i-th messenger is the messenger for the i-th peer. Broadcast reaches every peer, including the
/// broadcaster itself.
pub fn loopback_network(
    peers: impl IntoIterator<Item = ValidatorAddress>,
) -> Vec<LoopbackMessenger> {
    let mut all_peers = IndexMap::new();
    let peers_and_inboxes: Vec<(ValidatorAddress, Receiver<(ValidatorAddress, Envelope)>)> = peers
        .into_iter()
        .map(|peer| {
            let (sender, receiver) = mpsc::sync_channel(INBOX_CAPACITY);
            all_peers.insert(peer, sender);
            (peer, receiver)
        })
        .collect();

    let all_peers = Arc::new(all_peers);
    let pool = ThreadPool::new(all_peers.len().max(1));

    peers_and_inboxes
        .into_iter()
        .map(|(my_address, inbox)| LoopbackMessenger {
            my_address,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            pool: pool.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::messages::CHANNEL_BLOCKS;

    fn addr(byte: u8) -> ValidatorAddress {
        ValidatorAddress::new([byte; 32])
    }

    #[test]
    fn broadcast_reports_one_completion_per_peer() {
        let mut network = loopback_network(vec![addr(1), addr(2), addr(3)]);
        let completions = network[0].broadcast(Envelope {
            channel_id: CHANNEL_BLOCKS,
            content: vec![42],
        });

        let outcomes: Vec<bool> = completions.iter().take(3).collect();
        assert_eq!(outcomes, vec![true, true, true]);

        for messenger in network.iter_mut() {
            let (origin, envelope) = loop {
                if let Some(received) = messenger.recv() {
                    break received;
                }
                std::thread::yield_now();
            };
            assert_eq!(origin, addr(1));
            assert_eq!(envelope.content, vec![42]);
        }
    }

    #[test]
    fn unicast_to_unknown_peer_fails() {
        let mut network = loopback_network(vec![addr(1)]);
        assert!(!network[0].send(
            addr(9),
            Envelope {
                channel_id: CHANNEL_BLOCKS,
                content: vec![],
            }
        ));
    }
}
