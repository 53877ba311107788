use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Stream id used by a model drawing sequentially from its own seed.
/// Forked streams (parallel chunks) start at 1.
pub const PRIMARY_STREAM: u64 = 0;

/// Stream ids used to derive per-model seeds from one root seed.
pub const FREQUENCY_SEED_STREAM: u64 = 1;
pub const SEVERITY_SEED_STREAM: u64 = 2;

/// A ChaCha20 generator positioned on `stream` of `seed`.
///
/// Different streams of the same seed are independent, which is what lets a
/// model hand out per-chunk generators without sharing state.
pub fn stream_rng(seed: u64, stream: u64) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Derive a child seed from `root` deterministically.
pub fn derive_seed(root: u64, stream: u64) -> u64 {
    stream_rng(root, stream).next_u64()
}

/// Fresh seed from OS entropy, for callers that did not pin one.
pub fn entropy_seed() -> u64 {
    rand::rng().random()
}
