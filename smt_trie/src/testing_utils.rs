use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::digest::{Digest, DIGEST_LEN};

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub(crate) fn random_digest<R: Rng>(rng: &mut R) -> Digest {
    let mut bytes = [0; DIGEST_LEN];
    rng.fill(&mut bytes);
    Digest(bytes)
}

pub(crate) fn random_leaves<R: Rng>(rng: &mut R, n: usize) -> Vec<Digest> {
    (0..n).map(|_| random_digest(rng)).collect()
}
