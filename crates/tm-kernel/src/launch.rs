use std::fmt;

/// Round `x` up to the next multiple of `tile`.
///
/// `tile` must be non-zero.
pub fn round_up(x: usize, tile: usize) -> usize {
    x.div_ceil(tile) * tile
}

/// Launch geometry of one square tiled dispatch.
///
/// The global range covers `[0, N)` in both dimensions, rounded up to a
/// multiple of the tile so every output element belongs to some work-group.
/// Work-items in the padding exist but never write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    n: usize,
    tile: usize,
}

impl NdRange {
    /// Geometry for an `n`×`n` output and `tile`×`tile` work-groups.
    ///
    /// # Panics
    /// Panics if `tile == 0`.
    pub fn square(n: usize, tile: usize) -> Self {
        assert!(tile > 0, "tile must be non-zero");
        NdRange { n, tile }
    }

    /// Matrix dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Work-group side length.
    pub fn tile(&self) -> usize {
        self.tile
    }

    /// Global size per dimension (N rounded up to a multiple of the tile).
    pub fn global(&self) -> usize {
        round_up(self.n, self.tile)
    }

    /// Work-items per work-group.
    pub fn local_items(&self) -> usize {
        self.tile * self.tile
    }

    /// Work-groups along one dimension.
    pub fn groups_per_dim(&self) -> usize {
        self.n.div_ceil(self.tile)
    }

    /// Total number of work-groups.
    pub fn group_count(&self) -> usize {
        self.groups_per_dim() * self.groups_per_dim()
    }

    /// Number of phases over the shared k dimension.
    pub fn phases(&self) -> usize {
        self.n.div_ceil(self.tile)
    }

    /// Row and column of the group with linear index `group`.
    pub fn group_coords(&self, group: usize) -> (usize, usize) {
        let per_dim = self.groups_per_dim();
        (group / per_dim, group % per_dim)
    }

    /// Returns true if the dispatch has no work at all (N = 0).
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

impl fmt::Display for NdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "global [{g}, {g}] local [{t}, {t}] ({groups} groups, {phases} phases)",
            g = self.global(),
            t = self.tile,
            groups = self.group_count(),
            phases = self.phases()
        )
    }
}
