//! Bounded-memory random access into a tiled pyramid.
//!
//! [`TiledPyramidCache`] resolves an `(octave, x, y)` query to a single
//! sample. Coordinates are octave-0 image coordinates:
//!
//! - the azimuth axis `x` is toroidal and wraps modulo the image width,
//! - the depth axis `y` is bounded; anything outside `[0, height)` is
//!   [`INVALID_SAMPLE`].
//!
//! Tiles are decoded on demand from the [`TileSource`] and evicted least
//! recently used first so the decoded bytes never exceed the budget.
//!
//! The cache mutates itself on every read (recency, inserts), so it is
//! accessed through `&mut self`. Sharing it between threads requires a
//! single writer, e.g. a `Mutex` around the whole cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pyramid::{PyramidDescriptor, PyramidError, TileKey, TileSource};
use crate::types::INVALID_SAMPLE;

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served by a resident tile.
    pub hits: u64,
    /// Reads that decoded a tile.
    pub misses: u64,
    /// Tiles dropped to stay within the budget.
    pub evictions: u64,
}

impl CacheStats {
    /// Counter difference `self - earlier`.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Self {
        Self {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            evictions: self.evictions.saturating_sub(earlier.evictions),
        }
    }
}

struct Resident {
    samples: Vec<f32>,
    width: u32,
    last_used: u64,
}

impl Resident {
    fn at(&self, tx: u32, ty: u32) -> f32 {
        self.samples[ty as usize * self.width as usize + tx as usize]
    }

    const fn bytes(&self) -> usize {
        self.samples.len() * size_of::<f32>()
    }
}

/// LRU tile cache over a pyramid, bounded by decoded bytes.
pub struct TiledPyramidCache<S> {
    source: S,
    tiles: HashMap<TileKey, Resident>,
    budget_bytes: usize,
    resident_bytes: usize,
    tick: u64,
    stats: CacheStats,
}

impl<S: TileSource> TiledPyramidCache<S> {
    /// Default budget in megabytes.
    pub const DEFAULT_MEGABYTES: usize = 100;

    /// Create a cache holding at most `megabytes` MiB of decoded tiles.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::BudgetTooSmall`] if one tile does not fit.
    pub fn new(source: S, megabytes: usize) -> Result<Self, PyramidError> {
        Self::with_budget_bytes(source, megabytes.saturating_mul(1024 * 1024))
    }

    /// Create a cache with an exact byte budget.
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::BudgetTooSmall`] if one tile does not fit.
    pub fn with_budget_bytes(source: S, budget_bytes: usize) -> Result<Self, PyramidError> {
        let tile_bytes = source.descriptor().tile().bytes();
        if budget_bytes < tile_bytes {
            return Err(PyramidError::BudgetTooSmall {
                budget_bytes,
                tile_bytes,
            });
        }
        Ok(Self {
            source,
            tiles: HashMap::new(),
            budget_bytes,
            resident_bytes: 0,
            tick: 0,
            stats: CacheStats::default(),
        })
    }

    /// Geometry of the underlying pyramid.
    pub fn descriptor(&self) -> &PyramidDescriptor {
        self.source.descriptor()
    }

    /// The backing tile source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Number of octaves in the pyramid.
    pub fn depth(&self) -> u32 {
        self.source.descriptor().depth()
    }

    /// Counters accumulated since construction.
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Decoded bytes currently resident.
    pub const fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    /// Configured byte budget.
    pub const fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Number of resident tiles.
    pub fn resident_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Whether `key` is currently resident.
    pub fn is_resident(&self, key: TileKey) -> bool {
        self.tiles.contains_key(&key)
    }

    /// Drop every resident tile.
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.resident_bytes = 0;
    }

    /// Read the sample at octave-0 coordinates `(x, y)` from `octave`.
    ///
    /// `x` wraps around the azimuth axis. A `y` outside the image (or a
    /// non-finite coordinate) yields [`INVALID_SAMPLE`].
    ///
    /// # Errors
    ///
    /// Returns [`PyramidError::OctaveOutOfRange`] if `octave` is not in
    /// the pyramid, or the source's error if a tile fails to decode.
    pub fn sample(&mut self, octave: u32, x: f64, y: f64) -> Result<f32, PyramidError> {
        let descriptor = self.source.descriptor();
        let Some(dims) = descriptor.octave(octave) else {
            return Err(PyramidError::OctaveOutOfRange {
                octave,
                depth: descriptor.depth(),
            });
        };
        let base = descriptor.base();
        let tile = descriptor.tile();

        if !x.is_finite() || !(0.0..f64::from(base.height)).contains(&y) {
            return Ok(INVALID_SAMPLE);
        }
        let width = f64::from(base.width);
        // `rem_euclid` of a tiny negative x rounds up to `width`.
        let x = match x.rem_euclid(width) {
            wrapped if wrapped >= width => 0.0,
            wrapped => wrapped,
        };

        #[allow(clippy::cast_possible_wrap)]
        let scale = 2.0_f64.powi(octave as i32);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (px, py) = (
            ((x / scale).floor() as u32).min(dims.width - 1),
            ((y / scale).floor() as u32).min(dims.height - 1),
        );

        let key = TileKey::new(octave, py / tile.height, px / tile.width);
        self.lookup(key, px % tile.width, py % tile.height)
    }

    fn lookup(&mut self, key: TileKey, tx: u32, ty: u32) -> Result<f32, PyramidError> {
        self.tick += 1;
        let tick = self.tick;
        if let Some(resident) = self.tiles.get_mut(&key) {
            resident.last_used = tick;
            self.stats.hits += 1;
            return Ok(resident.at(tx, ty));
        }

        let (_, _, width, height) = self.source.descriptor().tile_bounds(key)?;
        let samples = self.source.decode_tile(key)?;
        if samples.len() != width as usize * height as usize {
            return Err(PyramidError::TileDecode {
                key,
                message: format!(
                    "expected {} samples, got {}",
                    width as usize * height as usize,
                    samples.len()
                ),
            });
        }

        let resident = Resident {
            samples,
            width,
            last_used: tick,
        };
        self.make_room(resident.bytes());
        self.stats.misses += 1;
        log::trace!("tile cache miss {key}");

        let value = resident.at(tx, ty);
        self.resident_bytes += resident.bytes();
        self.tiles.insert(key, resident);
        Ok(value)
    }

    /// Evict least recently used tiles until `incoming` bytes fit.
    ///
    /// The victim is found by a linear scan; residency stays in the low
    /// hundreds of tiles (400 at the default budget and tile shape).
    fn make_room(&mut self, incoming: usize) {
        while self.resident_bytes + incoming > self.budget_bytes {
            let Some(oldest) = self
                .tiles
                .iter()
                .min_by_key(|(_, r)| r.last_used)
                .map(|(k, _)| *k)
            else {
                break;
            };
            if let Some(evicted) = self.tiles.remove(&oldest) {
                self.resident_bytes -= evicted.bytes();
                self.stats.evictions += 1;
                log::debug!(
                    "evicted tile {oldest} ({} bytes resident of {})",
                    self.resident_bytes,
                    self.budget_bytes
                );
            }
        }
    }
}
