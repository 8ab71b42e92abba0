/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that [start](Node::start) a node, as well as [the type](Node) which keeps the node
//! alive.
//!
//! A node is the set of threads that together track one chain: the poller (which pulls envelopes
//! off the messenger and routes them by channel ID), the engine loop (the single consumer of
//! consensus messages), the sync server, and, when any event handlers are registered, the event
//! bus. The node's `Drop` implementation delivers the cancellation signal to every thread and
//! joins them in dependency order, consumers before producers.

use std::{
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    chain::Chain,
    engine::{start_engine, ConsensusEngine, EngineConfiguration},
    event_bus::{start_event_bus, EventHandlers},
    events::Event,
    networking::{
        messenger::{HandlerRegistry, Messenger},
        receiving::{start_polling, ConsensusMessageHandler, SyncMessageHandler},
        sending::SenderHandle,
    },
    sync::{
        server::{SyncServer, SyncServerConfiguration},
        SyncConfiguration, SyncManager,
    },
    types::{block::Block, crypto_primitives::Keypair, data_types::ChainID},
    validator_manager::ValidatorManager,
};

/// Parameters that define the behaviour of a [`Node`] and should never change while it runs.
pub struct NodeConfiguration {
    /// The chain this node tracks.
    pub chain_id: ChainID,

    /// The keypair under which this node proposes and votes.
    pub keypair: Keypair,

    /// How long the engine waits in an epoch without progress before advancing to the next one.
    pub epoch_time: Duration,

    /// Sync request discipline (timeouts, backoff, bounds).
    pub sync: SyncConfiguration,

    /// Maximum number of block hashes the sync server puts in an inventory response.
    pub sync_inventory_limit: u32,

    /// Whether the default logging event handlers should be enabled. When set, [`Node::start`]
    /// adds the logging handlers from [`logging`](crate::logging) to whatever handlers it is
    /// given.
    pub log_events: bool,
}

impl NodeConfiguration {
    /// A configuration with conservative defaults for the given identity.
    pub fn new(chain_id: ChainID, keypair: Keypair) -> NodeConfiguration {
        NodeConfiguration {
            chain_id,
            keypair,
            epoch_time: Duration::from_secs(2),
            sync: SyncConfiguration {
                chain_id,
                ..SyncConfiguration::default()
            },
            sync_inventory_limit: 256,
            log_events: false,
        }
    }
}

/// A running node. Dropping it shuts down and joins every thread it started.
pub struct Node {
    chain: Arc<Chain>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    engine: Option<JoinHandle<()>>,
    engine_shutdown: Sender<()>,
    sync_server: Option<JoinHandle<()>>,
    sync_server_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Node {
    /// Start a node tracking the chain rooted at `genesis`.
    ///
    /// The `event_handlers` decide which [events](crate::events) are observed; pass
    /// [`EventHandlers::logging_only`] when only the built-in log output is wanted. When
    /// [`log_events`](NodeConfiguration::log_events) is set, the default logging handlers are
    /// added to `event_handlers` for every event type that does not already log.
    pub fn start<M: Messenger, V: ValidatorManager>(
        config: NodeConfiguration,
        genesis: Block,
        messenger: M,
        validator_manager: Arc<V>,
        mut event_handlers: EventHandlers,
    ) -> Node {
        if config.log_events {
            event_handlers.enable_logging();
        }

        let chain = Arc::new(Chain::new(config.chain_id, genesis));
        let genesis_hash = chain.root().hash();

        let (event_publisher, event_subscriber) = mpsc::channel::<Event>();
        let event_publisher = if event_handlers.is_empty() {
            None
        } else {
            Some(event_publisher)
        };

        // Inbound routing: the handler registry is fixed before the poller starts, so the
        // messenger never learns about the engine.
        let (to_engine, engine_inbox) = mpsc::channel();
        let (to_sync_server, sync_server_inbox) = mpsc::channel();
        let (to_sync_client, sync_client_inbox) = mpsc::channel();

        let mut registry = HandlerRegistry::new();
        registry
            .add_message_handler(Arc::new(ConsensusMessageHandler {
                to_engine: to_engine.clone(),
            }))
            .expect("the consensus channels are registered first");
        registry
            .add_message_handler(Arc::new(SyncMessageHandler {
                to_server: to_sync_server,
                to_client: to_sync_client,
            }))
            .expect("the sync channel does not collide with the consensus channels");

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let poller = start_polling(messenger.clone(), registry, poller_shutdown_receiver);

        // Sync: the manager is owned and ticked by the engine; the server runs its own thread.
        let mut sync_manager = SyncManager::new(
            config.sync.clone(),
            chain.clone(),
            SenderHandle::new(messenger.clone()),
            sync_client_inbox,
            to_engine,
            event_publisher.clone(),
        );
        let own_address = config.keypair.address();
        let initial_validator_set = validator_manager.validator_set(&genesis_hash);
        for peer in initial_validator_set.validators() {
            if *peer != own_address {
                sync_manager.register_peer(*peer);
            }
        }

        let (sync_server_shutdown, sync_server_shutdown_receiver) = mpsc::channel();
        let sync_server = SyncServer::new(
            SyncServerConfiguration {
                chain_id: config.chain_id,
                inventory_limit: config.sync_inventory_limit,
            },
            chain.clone(),
            sync_server_inbox,
            messenger.clone(),
            sync_server_shutdown_receiver,
            event_publisher.clone(),
        )
        .start();

        let engine = ConsensusEngine::new(
            EngineConfiguration {
                chain_id: config.chain_id,
                keypair: config.keypair,
                epoch_time: config.epoch_time,
            },
            chain.clone(),
            validator_manager,
            messenger,
            sync_manager,
            event_publisher,
        );
        let (engine_shutdown, engine_shutdown_receiver) = mpsc::channel();
        let engine = start_engine(engine, engine_inbox, engine_shutdown_receiver);

        let (event_bus, event_bus_shutdown) = if event_handlers.is_empty() {
            (None, None)
        } else {
            let (shutdown, shutdown_receiver) = mpsc::channel();
            (
                Some(start_event_bus(
                    event_handlers,
                    event_subscriber,
                    shutdown_receiver,
                )),
                Some(shutdown),
            )
        };

        Node {
            chain,
            poller: Some(poller),
            poller_shutdown,
            engine: Some(engine),
            engine_shutdown,
            sync_server: Some(sync_server),
            sync_server_shutdown,
            event_bus,
            event_bus_shutdown,
        }
    }

    /// The chain store this node maintains. Cheap to clone and safe to read from any thread.
    pub fn chain(&self) -> Arc<Chain> {
        self.chain.clone()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Safety: the order of thread shutdown in this function is important, as the threads make
        // assumptions about the validity of their channels based on it. The engine and sync
        // server threads receive messages from the poller, and assume that the poller will live
        // longer than them.
        if let (Some(event_bus), Some(shutdown)) =
            (self.event_bus.take(), self.event_bus_shutdown.take())
        {
            let _ = shutdown.send(());
            let _ = event_bus.join();
        }

        let _ = self.engine_shutdown.send(());
        let _ = self.engine.take().unwrap().join();

        let _ = self.sync_server_shutdown.send(());
        let _ = self.sync_server.take().unwrap().join();

        let _ = self.poller_shutdown.send(());
        let _ = self.poller.take().unwrap().join();
    }
}
