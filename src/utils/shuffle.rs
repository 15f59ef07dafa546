//! Index permutation used to randomize probe order
//!
//! Visits every index of `0..len` exactly once using the additive step
//! `x_{i+1} = (x_i + step) % len` with `gcd(step, len) == 1`. Nothing is
//! materialized, so the same scheme works for a /8 of addresses and for a
//! handful of ports.

use gcd::Gcd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPermutation {
    len: u64,
    first: u64,
    step: u64,
}

impl IndexPermutation {
    /// Random permutation of `0..len`
    pub fn new(len: u64) -> Self {
        Self::from_rng(len, &mut rand::thread_rng())
    }

    /// Repeatable permutation: the same seed yields the same order
    pub fn with_seed(len: u64, seed: u64) -> Self {
        Self::from_rng(len, &mut StdRng::seed_from_u64(seed))
    }

    fn from_rng<R: Rng>(len: u64, rng: &mut R) -> Self {
        if len == 0 {
            return Self { len, first: 0, step: 1 };
        }
        Self {
            len,
            first: rng.gen_range(0..len),
            step: pick_random_coprime(len, rng),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `i`-th index of the traversal
    pub fn get(&self, i: u64) -> u64 {
        if self.len == 0 {
            return 0;
        }
        let pos = (self.first as u128 + (i as u128) * (self.step as u128)) % self.len as u128;
        pos as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

fn pick_random_coprime<R: Rng>(end: u64, rng: &mut R) -> u64 {
    if end <= 2 {
        return 1;
    }
    let range_boundary = end / 4;
    let lower_range = range_boundary.max(1);
    let upper_range = end - range_boundary;

    for _ in 0..10 {
        let candidate = rng.gen_range(lower_range..upper_range);
        if end.gcd(candidate) == 1 {
            return candidate;
        }
    }

    // end - 1 is always coprime with end
    end - 1
}
