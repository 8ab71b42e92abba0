/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types common across the components of the consensus core.
//!
//! The types defined in this module are either:
//! 1. "Inert" newtypes that are sent around and inspected, but have no active behavior
//!    ([`data_types`]), or
//! 2. Protocol data structures: [blocks](block), [votes](voting), and
//!    [validator sets](validator_set), together with the [cryptographic primitives]
//!    (crypto_primitives) that authenticate them.

pub mod block;

pub mod crypto_primitives;

pub mod data_types;

pub mod validator_set;

pub mod voting;
