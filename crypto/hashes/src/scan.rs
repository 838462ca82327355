//! Exact re-verification of nonce ranges flagged by an accelerator.

use crate::pow_hash::BlockContext;
use std::ops::RangeInclusive;

/// Best nonce found in a range and its comparison word.
///
/// `value` is bytes 24..28 of the digest read little-endian. It is only
/// defined for digests whose top word (bytes 28..32) is zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub value: u32,
    pub nonce: u32,
}

/// Cheap filter evaluated per result slot: does any nonce in the range
/// produce a digest with a zero top word?
pub fn has_zero_top_word(ctx: &BlockContext, nonces: RangeInclusive<u32>) -> bool {
    nonces.into_iter().any(|nonce| ctx.digest_words(nonce)[7] == 0)
}

/// Recomputes every nonce in `nonces` and returns the lowest candidate.
///
/// Returns `None` when no nonce passes the top-word filter, which happens
/// when the accelerator flag was a false positive.
pub fn scan_range(ctx: &BlockContext, nonces: RangeInclusive<u32>) -> Option<Candidate> {
    nonces
        .into_iter()
        .filter_map(|nonce| {
            let words = ctx.digest_words(nonce);
            (words[7] == 0).then(|| Candidate {
                value: words[6].swap_bytes(),
                nonce,
            })
        })
        .min_by_key(|candidate| candidate.value)
}
