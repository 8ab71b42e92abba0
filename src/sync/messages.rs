/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged as part of the block sync protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    data_types::{BlockHeight, ChainID, CryptoHash},
};

/// All traffic on the sync channel.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum SyncMessage {
    Request(SyncRequest),
    Response(SyncResponse),
}

/// Requests served by the [sync server](crate::sync::server::SyncServer).
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum SyncRequest {
    /// Ask a peer which blocks it holds from a given height onwards.
    Inventory(InventoryRequest),

    /// Ask a peer for a single block by hash.
    Block(BlockRequest),
}

/// Responses consumed by the [sync manager](crate::sync::SyncManager).
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum SyncResponse {
    Inventory(InventoryResponse),
    Block(BlockResponse),
}

#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct InventoryRequest {
    pub chain_id: ChainID,
    pub start_height: BlockHeight,
    pub limit: u32,
}

#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct BlockRequest {
    pub chain_id: ChainID,
    pub block: CryptoHash,
}

#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct InventoryResponse {
    pub blocks: Vec<CryptoHash>,
}

#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct BlockResponse {
    pub block: Block,
}

impl From<SyncRequest> for SyncMessage {
    fn from(request: SyncRequest) -> Self {
        SyncMessage::Request(request)
    }
}

impl From<SyncResponse> for SyncMessage {
    fn from(response: SyncResponse) -> Self {
        SyncMessage::Response(response)
    }
}
