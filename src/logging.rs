/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enables them via the node's
//! [configuration](crate::node::NodeConfiguration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following
//! snippet is how a [ReceiveBlock](crate::events::ReceiveBlockEvent) is printed:
//!
//! ```text
//! ReceiveBlock, 1701329264, Id5u7f6, fNGCJyk
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the address of the
//!   origin of the block.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the
//!   received block.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const VALIDATE_BLOCK: &str = "ValidateBlock";
pub const COMMIT_BLOCK: &str = "CommitBlock";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";

pub const RECEIVE_BLOCK: &str = "ReceiveBlock";
pub const RECEIVE_VOTE: &str = "ReceiveVote";

pub const START_EPOCH: &str = "StartEpoch";
pub const COLLECT_CERTIFICATE: &str = "CollectCertificate";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";
pub const RECEIVE_SYNC_REQUEST: &str = "ReceiveSyncRequest";
pub const SEND_SYNC_RESPONSE: &str = "SendSyncResponse";

/// Implemented by event types. Used to get a closure that logs the event.
pub trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.block.hash().bytes()),
                event.block.height
            )
        })
    }
}

impl Logger for ValidateBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ValidateBlockEvent| {
            log::info!(
                "{}, {}, {}",
                VALIDATE_BLOCK,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.block.bytes())
            )
        })
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.block.bytes()),
                event.height
            )
        })
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.block.hash().bytes()),
                event.block.height,
                event.block.epoch
            )
        })
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.vote.block.bytes()),
                event.vote.epoch
            )
        })
    }
}

impl Logger for ReceiveBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_BLOCK,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.origin.bytes()),
                first_seven_base64_chars(&event.block.bytes())
            )
        })
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.origin.bytes()),
                first_seven_base64_chars(&event.vote.block.bytes()),
                event.vote.epoch
            )
        })
    }
}

impl Logger for StartEpochEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &StartEpochEvent| {
            log::info!(
                "{}, {}, {}",
                START_EPOCH,
                secs_since_unix_epoch(event.timestamp),
                event.epoch
            )
        })
    }
}

impl Logger for CollectCertificateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &CollectCertificateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COLLECT_CERTIFICATE,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.block.bytes()),
                event.epoch
            )
        })
    }
}

impl Logger for StartSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &StartSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                START_SYNC,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.peer.bytes()),
                first_seven_base64_chars(&event.block.bytes())
            )
        })
    }
}

impl Logger for EndSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &EndSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                END_SYNC,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.peer.bytes()),
                first_seven_base64_chars(&event.block.bytes())
            )
        })
    }
}

impl Logger for ReceiveSyncRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &ReceiveSyncRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_SYNC_REQUEST,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.peer.bytes()),
                event.start_height,
                event.limit
            )
        })
    }
}

impl Logger for SendSyncResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        Box::new(|event: &SendSyncResponseEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SEND_SYNC_RESPONSE,
                secs_since_unix_epoch(event.timestamp),
                first_seven_base64_chars(&event.peer.bytes()),
                event.blocks.len()
            )
        })
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("event timestamps are after the Unix epoch")
        .as_secs()
}

fn first_seven_base64_chars(bytes: &[u8; 32]) -> String {
    STANDARD_NO_PAD.encode(bytes)[0..7].to_string()
}
