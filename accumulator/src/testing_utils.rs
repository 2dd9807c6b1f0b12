use ethereum_types::H256;
use rand::{rngs::StdRng, SeedableRng};

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A key whose low 8 bytes are `i`.
pub(crate) fn dumkey(i: u64) -> H256 {
    H256::from_low_u64_be(i)
}

/// A value distinct from every [`dumkey`].
pub(crate) fn dumval(i: u64) -> H256 {
    let mut v = H256::from_low_u64_be(i);
    v.0[0] = 0xaa;
    v
}
