//! Tunables for one kernel dispatch.
//!
//! The tile size can be bound two ways. `Specialized` picks one of a family
//! of kernel variants compiled with the tile as a constant; `Runtime` runs a
//! single kernel that reads the tile as an ordinary argument. Both walk the
//! same loop nest in the same order, so their results are bitwise identical.

use std::fmt;

use crate::error::{KernelError, Result};

/// Matrix dimension used when none is given.
pub const DEFAULT_N: usize = 256;

/// Tile size baked in at build time (`TM_TILE_SIZE`, 16 when unset).
pub const DEFAULT_TILE: usize = parse_tile(env!("TM_DEFAULT_TILE"));

/// Absolute tolerance of the reference check.
pub const DEFAULT_TOLERANCE: f32 = 1e-4;

// 1, 2, 4, 8, 10, 16, 32 and the build-time tile, generated by build.rs.
include!(concat!(env!("OUT_DIR"), "/specialized_tiles.rs"));

const fn parse_tile(raw: &str) -> usize {
    let bytes = raw.as_bytes();
    assert!(!bytes.is_empty(), "TM_DEFAULT_TILE is empty");
    let mut value = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        assert!(bytes[i].is_ascii_digit(), "TM_DEFAULT_TILE is not a number");
        value = value * 10 + (bytes[i] - b'0') as usize;
        i += 1;
    }
    assert!(value > 0, "TM_DEFAULT_TILE must be at least 1");
    value
}

/// Returns true if `tile` has a specialized kernel variant.
pub const fn is_specialized(tile: usize) -> bool {
    let mut i = 0;
    while i < SPECIALIZED_TILES.len() {
        if SPECIALIZED_TILES[i] == tile {
            return true;
        }
        i += 1;
    }
    false
}

/// How the tile size reaches the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStrategy {
    /// Tile is a compile-time constant of the selected kernel variant.
    Specialized,
    /// Tile is read at dispatch time by a single generic kernel.
    Runtime,
}

impl TileStrategy {
    /// Short lowercase name, also used as the sweep's `method` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TileStrategy::Specialized => "specialized",
            TileStrategy::Runtime => "runtime",
        }
    }
}

impl fmt::Display for TileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tile size and binding strategy for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub tile: usize,
    pub strategy: TileStrategy,
}

impl KernelConfig {
    pub fn new(tile: usize, strategy: TileStrategy) -> Self {
        Self { tile, strategy }
    }

    /// Configuration for `tile` when no strategy was asked for: the
    /// specialized variant if one exists, the runtime kernel otherwise.
    pub fn for_tile(tile: usize) -> Self {
        let strategy = if is_specialized(tile) {
            TileStrategy::Specialized
        } else {
            TileStrategy::Runtime
        };
        Self { tile, strategy }
    }

    /// Number of work-items in one work-group (TILE²).
    pub fn work_group_size(&self) -> Option<usize> {
        self.tile.checked_mul(self.tile)
    }

    /// Check the configuration against a device's work-group limit.
    ///
    /// # Errors
    /// `InvalidTile` for a zero tile, `WorkGroupTooLarge` when TILE² exceeds
    /// `max_work_group_size`, `UnspecializedTile` when the specialized
    /// strategy has no variant for this tile.
    pub fn validate(&self, max_work_group_size: usize) -> Result<()> {
        if self.tile == 0 {
            return Err(KernelError::InvalidTile(self.tile));
        }
        match self.work_group_size() {
            Some(items) if items <= max_work_group_size => {}
            _ => {
                return Err(KernelError::WorkGroupTooLarge {
                    tile: self.tile,
                    limit: max_work_group_size,
                })
            }
        }
        if self.strategy == TileStrategy::Specialized && !is_specialized(self.tile) {
            return Err(KernelError::UnspecializedTile {
                tile: self.tile,
                available: SPECIALIZED_TILES,
            });
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::for_tile(DEFAULT_TILE)
    }
}

/// Smallest tile without a specialized variant (3 unless built with
/// `TM_TILE_SIZE=3`).
#[cfg(test)]
pub(crate) fn unspecialized_tile() -> usize {
    (1..).find(|&t| !is_specialized(t)).unwrap_or(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tile() {
        assert_eq!(parse_tile("16"), 16);
        assert_eq!(parse_tile("7"), 7);
        assert_eq!(parse_tile("128"), 128);
    }

    #[test]
    fn test_default_tile_is_valid() {
        assert!(DEFAULT_TILE > 0);
        let cfg = KernelConfig::default();
        assert_eq!(cfg.tile, DEFAULT_TILE);
        assert!(cfg.validate(usize::MAX).is_ok());
    }

    #[test]
    fn test_build_time_tile_is_specialized() {
        assert!(is_specialized(DEFAULT_TILE));
        assert_eq!(KernelConfig::default().strategy, TileStrategy::Specialized);
        let cfg = KernelConfig::new(DEFAULT_TILE, TileStrategy::Specialized);
        assert!(cfg.validate(DEFAULT_TILE * DEFAULT_TILE).is_ok());
    }

    #[test]
    fn test_for_tile_picks_strategy() {
        assert_eq!(
            KernelConfig::for_tile(8),
            KernelConfig::new(8, TileStrategy::Specialized)
        );
        let cfg = KernelConfig::for_tile(unspecialized_tile());
        assert_eq!(cfg.strategy, TileStrategy::Runtime);
        assert!(cfg.validate(1024).is_ok());
    }

    #[test]
    fn test_zero_tile_rejected() {
        let cfg = KernelConfig::new(0, TileStrategy::Runtime);
        assert!(matches!(cfg.validate(1024), Err(KernelError::InvalidTile(0))));
    }

    #[test]
    fn test_work_group_limit() {
        let cfg = KernelConfig::new(32, TileStrategy::Runtime);
        assert!(cfg.validate(1024).is_ok());
        assert!(matches!(
            cfg.validate(256),
            Err(KernelError::WorkGroupTooLarge { tile: 32, limit: 256 })
        ));
    }

    #[test]
    fn test_overflowing_tile_rejected() {
        let cfg = KernelConfig::new(usize::MAX, TileStrategy::Runtime);
        assert!(matches!(
            cfg.validate(usize::MAX),
            Err(KernelError::WorkGroupTooLarge { .. })
        ));
    }

    #[test]
    fn test_unspecialized_tile() {
        let tile = unspecialized_tile();
        let cfg = KernelConfig::new(tile, TileStrategy::Specialized);
        assert!(matches!(
            cfg.validate(1024),
            Err(KernelError::UnspecializedTile { tile: t, .. }) if t == tile
        ));
        // The runtime kernel takes any tile.
        assert!(KernelConfig::new(tile, TileStrategy::Runtime).validate(1024).is_ok());
    }

    #[test]
    fn test_specialized_family() {
        for &tile in SPECIALIZED_TILES {
            assert!(is_specialized(tile));
        }
        for tile in [1, 2, 4, 8, 10, 16, 32] {
            assert!(is_specialized(tile));
        }
        assert!(SPECIALIZED_TILES.windows(2).all(|w| w[0] < w[1]));
        assert!(!is_specialized(0));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(TileStrategy::Specialized.to_string(), "specialized");
        assert_eq!(TileStrategy::Runtime.as_str(), "runtime");
    }
}
