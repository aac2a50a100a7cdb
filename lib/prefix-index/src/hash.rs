// SPDX-FileCopyrightText: Copyright (c) 2025 The endpoint-picker authors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rolling block hashing for prompt prefixes.
//!
//! A prompt is chunked into fixed-size byte blocks and each block is hashed
//! together with the previous block's hash, so a block hash identifies the
//! whole prefix ending at that block, not the block content alone. The
//! chain is seeded from the model name: identical prompts sent to different
//! models never share a hash.

use xxhash_rust::xxh64::{Xxh64, xxh64};

/// Returns the chained xxh64 hashes of every *full* `block_size`-byte block
/// of `prompt`, in order. A trailing partial block is never hashed.
///
/// For block `i`, the digest covers the previous hash (little-endian) plus
/// the block bytes; the hash preceding block 0 is the hash of the model
/// name. The chain is deterministic across processes for a given model
/// name, block size and byte stream.
pub fn block_hash_chain<'a>(
    model: &str,
    prompt: &'a [u8],
    block_size: usize,
) -> impl Iterator<Item = u64> + use<'a> {
    let seed = xxh64(model.as_bytes(), 0);
    prompt.chunks_exact(block_size).scan(seed, |prev, block| {
        let mut digest = Xxh64::new(0);
        digest.update(&prev.to_le_bytes());
        digest.update(block);
        *prev = digest.digest();
        Some(*prev)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_blocks_only() {
        let hashes: Vec<u64> = block_hash_chain("m", b"0123456789a", 5).collect();
        assert_eq!(hashes.len(), 2); // trailing "a" is dropped
    }

    #[test]
    fn under_one_block_yields_nothing() {
        assert_eq!(block_hash_chain("m", b"hi", 5).count(), 0);
    }

    #[test]
    fn deterministic() {
        let a: Vec<u64> = block_hash_chain("model-a", b"0123456789", 5).collect();
        let b: Vec<u64> = block_hash_chain("model-a", b"0123456789", 5).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn model_name_seeds_the_chain() {
        let a: Vec<u64> = block_hash_chain("model-a", b"0123456789", 5).collect();
        let b: Vec<u64> = block_hash_chain("model-b", b"0123456789", 5).collect();
        assert_ne!(a[0], b[0]);
        assert_ne!(a[1], b[1]);
    }

    #[test]
    fn chaining_distinguishes_prefixes() {
        // The second block of "aaaaabbbbb" and the first block of "bbbbb"
        // share content but not position in the chain.
        let long: Vec<u64> = block_hash_chain("m", b"aaaaabbbbb", 5).collect();
        let short: Vec<u64> = block_hash_chain("m", b"bbbbb", 5).collect();
        assert_ne!(long[1], short[0]);
    }

    #[test]
    fn shared_prefix_shares_hashes() {
        let a: Vec<u64> = block_hash_chain("m", b"aaaaabbbbbccccc", 5).collect();
        let b: Vec<u64> = block_hash_chain("m", b"aaaaabbbbbzzzzz", 5).collect();
        assert_eq!(a[0], b[0]);
        assert_eq!(a[1], b[1]);
        assert_ne!(a[2], b[2]);
    }
}
