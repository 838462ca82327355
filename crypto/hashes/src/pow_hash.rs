//! Header hashing with a precomputed first chunk.
//!
//! A getwork header is 80 bytes hashed as two SHA-256 chunks. The first
//! chunk never changes while a nonce range is searched, so its compression
//! result (the midstate) is delivered by the work source and reused for
//! every nonce. [`BlockContext`] extends the midstate with the nonce
//! independent parts of the second chunk so an accelerator only has to
//! finish the rounds that depend on the nonce.

use sha2::compress256;
use sha2::digest::generic_array::GenericArray;

/// SHA-256 initial hash value.
pub const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// Round constants for the four rounds evaluated on the host.
const K: [u32; 4] = [0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5];

/// Message length of the header in bits (80 bytes).
const HEADER_BITS: u32 = 640;

/// Message length of the second pass in bits (one 32-byte digest).
const DIGEST_BITS: u32 = 256;

/// First padding word following the message.
const PAD: u32 = 0x8000_0000;

#[inline(always)]
fn small_sigma0(x: u32) -> u32 {
    x.rotate_right(7) ^ x.rotate_right(18) ^ (x >> 3)
}

#[inline(always)]
fn small_sigma1(x: u32) -> u32 {
    x.rotate_right(17) ^ x.rotate_right(19) ^ (x >> 10)
}

#[inline(always)]
fn big_sigma0(x: u32) -> u32 {
    x.rotate_right(2) ^ x.rotate_right(13) ^ x.rotate_right(22)
}

#[inline(always)]
fn big_sigma1(x: u32) -> u32 {
    x.rotate_right(6) ^ x.rotate_right(11) ^ x.rotate_right(25)
}

#[inline(always)]
fn ch(e: u32, f: u32, g: u32) -> u32 {
    g ^ (e & (f ^ g))
}

#[inline(always)]
fn maj(a: u32, b: u32, c: u32) -> u32 {
    (a & b) | (c & (a | b))
}

/// One SHA-256 round over `state` (a..h).
fn round(state: &mut [u32; 8], k: u32, w: u32) {
    let [a, b, c, d, e, f, g, h] = *state;
    let t1 = h
        .wrapping_add(big_sigma1(e))
        .wrapping_add(ch(e, f, g))
        .wrapping_add(k)
        .wrapping_add(w);
    let t2 = big_sigma0(a).wrapping_add(maj(a, b, c));
    *state = [t1.wrapping_add(t2), a, b, c, d.wrapping_add(t1), e, f, g];
}

/// Reads `N` little-endian words from `bytes`, the layout getwork uses for
/// `data` and `midstate`.
pub fn le_words<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Runs the SHA-256 compression function over one chunk of message words.
pub fn compress(state: &mut [u32; 8], words: &[u32; 16]) {
    let mut block = [0u8; 64];
    for (chunk, word) in block.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    compress256(state, std::slice::from_ref(GenericArray::from_slice(&block)));
}

/// Compression of the first header chunk starting from the SHA-256 IV.
pub fn midstate(first_chunk: &[u32; 16]) -> [u32; 8] {
    let mut state = SHA256_IV;
    compress(&mut state, first_chunk);
    state
}

/// Accelerator-side search context for one header.
///
/// Layout is fixed (`repr(C)`, 28 words) because it is copied verbatim into
/// the device input buffer. Only `nonce` changes while a work unit is live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct BlockContext {
    /// Midstate of the first chunk.
    pub state: [u32; 8],
    /// Working variables after the three nonce-independent rounds of the
    /// second chunk.
    pub round3: [u32; 8],
    pub merkle: u32,
    pub ntime: u32,
    pub nbits: u32,
    /// Nonce base of the next dispatch.
    pub nonce: u32,
    /// W16, complete.
    pub w16: u32,
    /// W17, complete.
    pub w17: u32,
    /// W18 without the `sigma0(nonce)` term.
    pub w18_partial: u32,
    /// W19 without the nonce term.
    pub w19_partial: u32,
    /// W31 without `sigma1(W29) + W24`.
    pub w31_partial: u32,
    /// W32 without `sigma1(W30) + W25`.
    pub w32_partial: u32,
    /// T1 of round 3 without the nonce.
    pub t1_partial: u32,
    /// T2 of round 3.
    pub t2: u32,
}

impl BlockContext {
    /// Number of 32-bit words in the device representation.
    pub const WORDS: usize = 28;

    /// Derives the context from a midstate and the first three words of the
    /// second chunk (merkle tail, time, bits).
    pub fn precalc(state: &[u32; 8], tail: &[u32; 3]) -> Self {
        let [merkle, ntime, nbits] = *tail;

        let mut round3 = *state;
        round(&mut round3, K[0], merkle);
        round(&mut round3, K[1], ntime);
        round(&mut round3, K[2], nbits);

        let w16 = merkle.wrapping_add(small_sigma0(ntime));
        let w17 = ntime
            .wrapping_add(small_sigma0(nbits))
            .wrapping_add(small_sigma1(HEADER_BITS));
        let w18_partial = nbits.wrapping_add(small_sigma1(w16));
        let w19_partial = small_sigma0(PAD).wrapping_add(small_sigma1(w17));
        let w31_partial = HEADER_BITS.wrapping_add(small_sigma0(w16));
        let w32_partial = w16.wrapping_add(small_sigma0(w17));

        let [a, b, c, _, e, f, g, h] = round3;
        let t1_partial = h
            .wrapping_add(big_sigma1(e))
            .wrapping_add(ch(e, f, g))
            .wrapping_add(K[3]);
        let t2 = big_sigma0(a).wrapping_add(maj(a, b, c));

        Self {
            state: *state,
            round3,
            merkle,
            ntime,
            nbits,
            nonce: 0,
            w16,
            w17,
            w18_partial,
            w19_partial,
            w31_partial,
            w32_partial,
            t1_partial,
            t2,
        }
    }

    /// Flattens the context in device field order.
    pub fn to_words(&self) -> [u32; Self::WORDS] {
        let mut words = [0u32; Self::WORDS];
        words[..8].copy_from_slice(&self.state);
        words[8..16].copy_from_slice(&self.round3);
        words[16..].copy_from_slice(&[
            self.merkle,
            self.ntime,
            self.nbits,
            self.nonce,
            self.w16,
            self.w17,
            self.w18_partial,
            self.w19_partial,
            self.w31_partial,
            self.w32_partial,
            self.t1_partial,
            self.t2,
        ]);
        words
    }

    /// Second header chunk with `nonce` patched in, padding included.
    pub fn second_chunk(&self, nonce: u32) -> [u32; 16] {
        let mut words = [0u32; 16];
        words[..5].copy_from_slice(&[self.merkle, self.ntime, self.nbits, nonce, PAD]);
        words[15] = HEADER_BITS;
        words
    }

    /// Final double SHA-256 state for `nonce`, as big-endian digest words.
    pub fn digest_words(&self, nonce: u32) -> [u32; 8] {
        let mut first = self.state;
        compress(&mut first, &self.second_chunk(nonce));

        let mut chunk = [0u32; 16];
        chunk[..8].copy_from_slice(&first);
        chunk[8] = PAD;
        chunk[15] = DIGEST_BITS;

        let mut out = SHA256_IV;
        compress(&mut out, &chunk);
        out
    }

    /// Double SHA-256 digest of the header carrying `nonce`.
    pub fn digest(&self, nonce: u32) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.digest_words(nonce)) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}
