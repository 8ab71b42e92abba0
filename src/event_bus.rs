/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events emitted by the [engine](crate::engine) and
//! [sync](crate::sync) threads and passes them to event handlers.
//!
//! When the thread receives a message containing an [event](crate::events::Event), it triggers
//! the execution of all handlers defined for the contained event type, where the handlers for
//! each event type are stored in [`EventHandlers`].
//!
//! A node's instance of `EventHandlers` contains:
//! 1. The user-defined handlers provided upon building the [node](crate::node::Node), and
//! 2. If logging is enabled via the node's configuration, the default logging handlers defined in
//!    [logging](crate::logging).

use std::{
    sync::mpsc::{Receiver, TryRecvError},
    thread,
    thread::JoinHandle,
};

use crate::{events::*, logging::Logger};

/// Pointer to a handler closure, parametrised by the argument (for our use case, event) type.
pub type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// The optional handlers enabled for an event type that implements the [`Logger`] trait: one
/// user-defined handler, and one logging handler defined in [`logging`](crate::logging).
pub struct HandlerPair<T: Logger> {
    pub user_defined_handler: Option<HandlerPtr<T>>,
    pub logging_handler: Option<HandlerPtr<T>>,
}

impl<T: Logger> HandlerPair<T> {
    /// Creates a new `HandlerPair` with the user-defined handler, and the default logging handler
    /// if logging is enabled.
    pub fn new(log: bool, user_defined_handler: Option<HandlerPtr<T>>) -> HandlerPair<T> {
        HandlerPair {
            user_defined_handler,
            logging_handler: if log { Some(T::get_logger()) } else { None },
        }
    }

    // Checks if no handlers are defined for this event.
    fn is_empty(&self) -> bool {
        self.user_defined_handler.is_none() && self.logging_handler.is_none()
    }

    fn fire(&self, event: &T) {
        if let Some(handler) = &self.logging_handler {
            handler(event)
        }
        if let Some(handler) = &self.user_defined_handler {
            handler(event)
        }
    }
}

/// Stores the `HandlerPair` of user-defined and optional logging handlers for each pre-defined
/// event type from [events](crate::events).
pub struct EventHandlers {
    pub insert_block_handlers: HandlerPair<InsertBlockEvent>,
    pub validate_block_handlers: HandlerPair<ValidateBlockEvent>,
    pub commit_block_handlers: HandlerPair<CommitBlockEvent>,

    pub propose_handlers: HandlerPair<ProposeEvent>,
    pub vote_handlers: HandlerPair<VoteEvent>,

    pub receive_block_handlers: HandlerPair<ReceiveBlockEvent>,
    pub receive_vote_handlers: HandlerPair<ReceiveVoteEvent>,

    pub start_epoch_handlers: HandlerPair<StartEpochEvent>,
    pub collect_certificate_handlers: HandlerPair<CollectCertificateEvent>,

    pub start_sync_handlers: HandlerPair<StartSyncEvent>,
    pub end_sync_handlers: HandlerPair<EndSyncEvent>,
    pub receive_sync_request_handlers: HandlerPair<ReceiveSyncRequestEvent>,
    pub send_sync_response_handlers: HandlerPair<SendSyncResponseEvent>,
}

impl EventHandlers {
    /// Create handler pairs holding only the default logging handlers (when `log` is set).
    pub fn logging_only(log: bool) -> EventHandlers {
        EventHandlers {
            insert_block_handlers: HandlerPair::new(log, None),
            validate_block_handlers: HandlerPair::new(log, None),
            commit_block_handlers: HandlerPair::new(log, None),
            propose_handlers: HandlerPair::new(log, None),
            vote_handlers: HandlerPair::new(log, None),
            receive_block_handlers: HandlerPair::new(log, None),
            receive_vote_handlers: HandlerPair::new(log, None),
            start_epoch_handlers: HandlerPair::new(log, None),
            collect_certificate_handlers: HandlerPair::new(log, None),
            start_sync_handlers: HandlerPair::new(log, None),
            end_sync_handlers: HandlerPair::new(log, None),
            receive_sync_request_handlers: HandlerPair::new(log, None),
            send_sync_response_handlers: HandlerPair::new(log, None),
        }
    }

    /// Fill in the default logging handler for every event type that does not have one yet.
    ///
    /// Pairs that already carry a logging handler are left alone.
    pub(crate) fn enable_logging(&mut self) {
        fn fill<T: Logger>(pair: &mut HandlerPair<T>) {
            if pair.logging_handler.is_none() {
                pair.logging_handler = Some(T::get_logger());
            }
        }

        fill(&mut self.insert_block_handlers);
        fill(&mut self.validate_block_handlers);
        fill(&mut self.commit_block_handlers);
        fill(&mut self.propose_handlers);
        fill(&mut self.vote_handlers);
        fill(&mut self.receive_block_handlers);
        fill(&mut self.receive_vote_handlers);
        fill(&mut self.start_epoch_handlers);
        fill(&mut self.collect_certificate_handlers);
        fill(&mut self.start_sync_handlers);
        fill(&mut self.end_sync_handlers);
        fill(&mut self.receive_sync_request_handlers);
        fill(&mut self.send_sync_response_handlers);
    }

    /// Checks if no handlers at all are registered. When this is the case, the event bus thread
    /// is not started.
    pub fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.validate_block_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.receive_block_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.start_epoch_handlers.is_empty()
            && self.collect_certificate_handlers.is_empty()
            && self.start_sync_handlers.is_empty()
            && self.end_sync_handlers.is_empty()
            && self.receive_sync_request_handlers.is_empty()
            && self.send_sync_response_handlers.is_empty()
    }

    fn fire(&self, event: &Event) {
        match event {
            Event::InsertBlock(e) => self.insert_block_handlers.fire(e),
            Event::ValidateBlock(e) => self.validate_block_handlers.fire(e),
            Event::CommitBlock(e) => self.commit_block_handlers.fire(e),
            Event::Propose(e) => self.propose_handlers.fire(e),
            Event::Vote(e) => self.vote_handlers.fire(e),
            Event::ReceiveBlock(e) => self.receive_block_handlers.fire(e),
            Event::ReceiveVote(e) => self.receive_vote_handlers.fire(e),
            Event::StartEpoch(e) => self.start_epoch_handlers.fire(e),
            Event::CollectCertificate(e) => self.collect_certificate_handlers.fire(e),
            Event::StartSync(e) => self.start_sync_handlers.fire(e),
            Event::EndSync(e) => self.end_sync_handlers.fire(e),
            Event::ReceiveSyncRequest(e) => self.receive_sync_request_handlers.fire(e),
            Event::SendSyncResponse(e) => self.send_sync_response_handlers.fire(e),
        }
    }
}

/// Spawn the event bus thread, which dispatches every event received on `event_subscriber` to the
/// handlers registered for its type.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("the event bus thread's shutdown channel was dropped while it was running")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire(&event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            // All event publishers gone: the emitting threads have shut down.
            Err(TryRecvError::Disconnected) => return,
        }
    })
}
