/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable peer-to-peer networking: the [`Messenger`](messenger::Messenger) trait, the
//! [envelope](messages::Envelope) wire format, channel-based
//! [routing](messenger::HandlerRegistry) of inbound traffic, and an in-process
//! [loopback](loopback) implementation.

pub mod loopback;

pub mod messages;

pub mod messenger;

pub(crate) mod receiving;

pub(crate) mod sending;
