//! Random number generation provider abstraction.
//!
//! Rate-based selection draws from an injected [`RandomProvider`] rather than
//! a hidden global generator, so tests can pin the draw sequence.
//!
//! - [`ThreadRandomProvider`]: production, thread-local non-cryptographic RNG
//! - [`SeededRandomProvider`]: ChaCha8 stream, reproducible from a seed
//! - [`ScriptedRandomProvider`]: replays a fixed list of draws

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Provider trait for the uniform draws used by rate selection.
///
/// Shared across every task that invokes the client, hence `Send + Sync`.
pub trait RandomProvider: Clone + Send + Sync + 'static {
    /// Generate a uniform f64 in `[0.0, 1.0)`.
    fn random_ratio(&self) -> f64;

    /// Generate a random bool with the given probability of being true.
    ///
    /// The probability should be between 0.0 and 1.0.
    fn random_bool(&self, probability: f64) -> bool {
        self.random_ratio() < probability
    }
}

/// Production random provider using thread-local RNG.
///
/// Uses `rand::rng()` (thread-local, non-cryptographic).
///
/// # Example
///
/// ```rust
/// use faultline_core::{RandomProvider, ThreadRandomProvider};
///
/// let random = ThreadRandomProvider::new();
/// let draw = random.random_ratio();
/// assert!((0.0..1.0).contains(&draw));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomProvider;

impl ThreadRandomProvider {
    /// Create a new production random provider.
    pub fn new() -> Self {
        Self
    }
}

impl RandomProvider for ThreadRandomProvider {
    fn random_ratio(&self) -> f64 {
        rand::rng().random()
    }
}

/// Deterministic provider backed by a shared ChaCha8 stream.
///
/// Clones share the same stream, so the sequence of draws across all clones
/// is reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct SeededRandomProvider {
    rng: Arc<Mutex<ChaCha8Rng>>,
    seed: u64,
}

impl SeededRandomProvider {
    /// Create a provider seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            seed,
        }
    }

    /// Seed this provider was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomProvider for SeededRandomProvider {
    fn random_ratio(&self) -> f64 {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random()
    }
}

/// Provider that replays a scripted sequence of draws.
///
/// Values are clamped into `[0, 1)`. Once the script runs out, `fallback` is
/// returned for every further draw.
#[derive(Debug, Clone)]
pub struct ScriptedRandomProvider {
    draws: Arc<Mutex<VecDeque<f64>>>,
    fallback: f64,
    taken: Arc<Mutex<u64>>,
}

impl ScriptedRandomProvider {
    /// Largest value below one that a draw may take.
    const MAX_DRAW: f64 = 1.0 - f64::EPSILON;

    /// Replay `draws` in order, then `0.0` forever.
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self::with_fallback(draws, 0.0)
    }

    /// Replay `draws` in order, then `fallback` forever.
    pub fn with_fallback(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            draws: Arc::new(Mutex::new(
                draws.into_iter().map(Self::clamp_draw).collect(),
            )),
            fallback: Self::clamp_draw(fallback),
            taken: Arc::new(Mutex::new(0)),
        }
    }

    /// Always return the same draw.
    pub fn constant(draw: f64) -> Self {
        Self::with_fallback(std::iter::empty(), draw)
    }

    /// Number of draws taken so far (scripted and fallback).
    pub fn draws_taken(&self) -> u64 {
        *self
            .taken
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn clamp_draw(draw: f64) -> f64 {
        if draw.is_nan() {
            0.0
        } else {
            draw.clamp(0.0, Self::MAX_DRAW)
        }
    }
}

impl RandomProvider for ScriptedRandomProvider {
    fn random_ratio(&self) -> f64 {
        *self
            .taken
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        self.draws
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
