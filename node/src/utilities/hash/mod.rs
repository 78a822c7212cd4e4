use blake2::Blake2b;
use digest::consts::U32;
use digest::Digest;

use crate::utilities::encoding::to_hex;

pub(crate) type Blake2b256 = Blake2b<U32>;

pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut dest = [0; 32];
    dest.copy_from_slice(Blake2b256::digest(data).as_slice());
    dest
}

/// Hex encoded Blake2b-256 digest, the form in which hashes travel inside proposals.
pub fn blake2_256_hex(data: &[u8]) -> String {
    to_hex(blake2_256(data))
}

/// Incremental hasher for values built from several parts, e.g. a block hash chained
/// with the previous block hash.
#[derive(Default)]
pub struct ChainHasher {
    inner: Blake2b256,
}

impl ChainHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<T: AsRef<[u8]>>(&mut self, data: T) {
        Digest::update(&mut self.inner, data.as_ref());
    }

    pub fn finalize_hex(self) -> String {
        to_hex(self.inner.finalize())
    }
}
