//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use txscope_core::Propagation;

/// Generate a random chain of implemented propagation modes.
pub fn random_chain(len: usize) -> Vec<Propagation> {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| Propagation::IMPLEMENTED.choose(&mut rng).copied())
        .collect()
}

/// Generate random scope-presence flags.
pub fn random_presence(len: usize) -> Vec<bool> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Generate key/value pairs with random values.
pub fn random_writes(count: usize) -> Vec<(String, String)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| (format!("key_{}", i), rng.gen::<u64>().to_string()))
        .collect()
}
