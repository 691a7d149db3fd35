use crate::error::CurateError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Picks `floor(n_files * test_split_size)` distinct indices in `[0, n_files)`
/// for the test partition. The same seed always yields the same selection.
pub fn calc_test_split_indices(
    n_files: usize,
    test_split_size: f64,
    seed: u64,
) -> Result<BTreeSet<usize>, CurateError> {
    if !(0.0..=1.0).contains(&test_split_size) {
        return Err(CurateError::InvalidSplitSize(test_split_size));
    }

    let n_test = ((n_files as f64) * test_split_size).floor() as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let indices = rand::seq::index::sample(&mut rng, n_files, n_test.min(n_files));

    Ok(indices.into_iter().collect())
}
