// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prefix-cache locality index for endpoint picking.
//!
//! This crate provides the data structures the prefix-locality scorer is
//! built on: a rolling 64-bit hash chained across fixed-size prompt blocks
//! ([`hash`]) and a concurrent two-level LRU mapping each block hash to the
//! workers recently seen serving it ([`store`]).
//!
//! The index is an *estimate* of which workers hold a prompt prefix hot in
//! KV cache. It observes scheduling decisions; it never talks to the
//! workers themselves.

pub mod hash;
pub mod store;

pub use hash::block_hash_chain;
pub use store::{PrefixStore, PrefixStoreConfig};
