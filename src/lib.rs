/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Byzantine Fault Tolerant consensus core for a chained-BFT protocol with dynamic validator
//! sets.
//!
//! The core answers two questions about a locally replicated chain tree:
//! 1. Is a freshly received block admissible with respect to its parent and the chain it extends?
//!    ([`validation`])
//! 2. Which chain tip should an honest node vote on or build upon? ([`fork_choice`])
//!
//! Around these two sit the [`engine`], which drives the per-epoch propose/vote/collect/advance
//! state machine over inbound blocks and votes, and the [`sync`] subsystem, which reconciles the
//! local [`chain`] store with peers whenever the engine observes references it cannot yet
//! resolve.
//!
//! Surrounding subsystems are consumed through traits and are pluggable:
//! - Peer-to-peer transport: [`networking::messenger::Messenger`] (an in-process
//!   [loopback](networking::loopback) implementation ships with the crate).
//! - Validator sets and proposer assignment: [`validator_manager::ValidatorManager`].
//!
//! A [`node::Node`] wires everything into a set of threads and shuts them down cleanly on drop.

pub mod chain;

pub mod engine;

pub mod event_bus;

pub mod events;

pub mod fork_choice;

pub mod logging;

pub mod networking;

pub mod node;

pub mod sync;

pub mod types;

pub mod validation;

pub mod validator_manager;
