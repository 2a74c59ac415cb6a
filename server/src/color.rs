//! Layer color allocation with a bounded recency pool

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;

/// Hues closer than this to the previous layer are re-rolled.
const MIN_HUE_GAP: u16 = 30;
const MAX_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl Hsl {
    fn hue_distance(&self, other: &Hsl) -> u16 {
        let diff = self.hue.abs_diff(other.hue);
        diff.min(360 - diff)
    }

    /// Parses the `hsl(h, s%, l%)` form produced by `Display`. Hue must be
    /// below 360 and both percentages at most 100.
    pub fn parse(color: &str) -> Option<Self> {
        let inner = color.trim().strip_prefix("hsl(")?.strip_suffix(')')?;
        let mut parts = inner.split(',').map(str::trim);
        let hue: u16 = parts.next()?.parse().ok()?;
        let saturation: u8 = parts.next()?.strip_suffix('%')?.parse().ok()?;
        let lightness: u8 = parts.next()?.strip_suffix('%')?.parse().ok()?;
        if parts.next().is_some() || hue >= 360 || saturation > 100 || lightness > 100 {
            return None;
        }
        Some(Self {
            hue,
            saturation,
            lightness,
        })
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// Hands out layer colors, avoiding the most recently issued ones.
///
/// Recency avoidance is a heuristic: after `MAX_ATTEMPTS` collisions the
/// last candidate is used anyway.
#[derive(Clone)]
pub struct ColorAllocator {
    recent: VecDeque<Hsl>,
    capacity: usize,
    rng: StdRng,
}

impl ColorAllocator {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity + 1),
            capacity,
            rng,
        }
    }

    fn random_color(&mut self) -> Hsl {
        Hsl {
            hue: self.rng.gen_range(0..360),
            saturation: self.rng.gen_range(60..90),
            lightness: self.rng.gen_range(45..65),
        }
    }

    fn is_acceptable(&self, candidate: &Hsl) -> bool {
        if self.recent.contains(candidate) {
            return false;
        }
        match self.recent.back() {
            Some(previous) => candidate.hue_distance(previous) >= MIN_HUE_GAP,
            None => true,
        }
    }

    pub fn next_color(&mut self) -> String {
        let mut candidate = self.random_color();
        for _ in 1..MAX_ATTEMPTS {
            if self.is_acceptable(&candidate) {
                break;
            }
            candidate = self.random_color();
        }
        self.push(candidate);
        candidate.to_string()
    }

    /// Records a color issued elsewhere, e.g. one restored from a snapshot.
    pub fn remember(&mut self, color: &str) {
        if let Some(hsl) = Hsl::parse(color) {
            self.push(hsl);
        }
    }

    fn push(&mut self, color: Hsl) {
        self.recent.push_back(color);
        while self.recent.len() > self.capacity {
            self.recent.pop_front();
        }
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }
}
