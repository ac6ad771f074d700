// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, YeeError};

/// Integer coordinate at twice the Yee-cell resolution.
///
/// Yee cell `(i, j, k)` covers half-cells `2i..=2i+1` on each axis. A field
/// component sits where exactly one (E) or exactly two (H) coordinates are odd.
pub type HalfCell = [i64; 3];

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    /// The memory-contiguous traversal axis.
    X,
    /// Second axis.
    Y,
    /// Third axis.
    Z,
}

impl Axis {
    /// All axes in memory order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index 0, 1 or 2.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Axis for an index, wrapping modulo 3.
    pub fn from_index(i: usize) -> Axis {
        Axis::ALL[i % 3]
    }

    /// First transverse axis in cyclic order.
    pub fn j(self) -> Axis {
        Axis::from_index(self.index() + 1)
    }

    /// Second transverse axis in cyclic order.
    pub fn k(self) -> Axis {
        Axis::from_index(self.index() + 2)
    }

    /// One half-cell step along this axis.
    pub fn unit(self) -> HalfCell {
        let mut u = [0; 3];
        u[self.index()] = 1;
        u
    }
}

/// Compile-time axis selector used to monomorphize the per-direction update loops.
pub trait AxisTag: Send + Sync + 'static {
    /// The axis this tag stands for.
    const AXIS: Axis;
    /// `AXIS.index()`, usable in constant expressions.
    const INDEX: usize;
}

/// Tag for the x direction.
pub struct XTag;
/// Tag for the y direction.
pub struct YTag;
/// Tag for the z direction.
pub struct ZTag;

impl AxisTag for XTag {
    const AXIS: Axis = Axis::X;
    const INDEX: usize = 0;
}

impl AxisTag for YTag {
    const AXIS: Axis = Axis::Y;
    const INDEX: usize = 1;
}

impl AxisTag for ZTag {
    const AXIS: Axis = Axis::Z;
    const INDEX: usize = 2;
}

/// Electric or magnetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// E field, updated in the first half-phase.
    Electric,
    /// H field, updated in the second half-phase.
    Magnetic,
}

/// One of the six field components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldDir {
    /// E along x.
    Ex,
    /// E along y.
    Ey,
    /// E along z.
    Ez,
    /// H along x.
    Hx,
    /// H along y.
    Hy,
    /// H along z.
    Hz,
}

impl FieldDir {
    /// All components, E first.
    pub const ALL: [FieldDir; 6] = [
        FieldDir::Ex,
        FieldDir::Ey,
        FieldDir::Ez,
        FieldDir::Hx,
        FieldDir::Hy,
        FieldDir::Hz,
    ];

    /// Component of the given kind along the given axis.
    pub fn new(kind: FieldKind, axis: Axis) -> FieldDir {
        let offset = match kind {
            FieldKind::Electric => 0,
            FieldKind::Magnetic => 3,
        };
        FieldDir::ALL[offset + axis.index()]
    }

    /// Decode the component stored at a half-cell from its parity.
    ///
    /// # Errors
    /// All-even and all-odd half-cells carry no component.
    pub fn from_half_cell(hc: HalfCell) -> Result<FieldDir> {
        let odd = hc.map(|v| v.rem_euclid(2) == 1);
        let count = odd.iter().filter(|&&o| o).count();
        match count {
            1 => {
                let axis = odd.iter().position(|&o| o).unwrap_or(0);
                Ok(FieldDir::new(FieldKind::Electric, Axis::from_index(axis)))
            }
            2 => {
                let axis = odd.iter().position(|&o| !o).unwrap_or(0);
                Ok(FieldDir::new(FieldKind::Magnetic, Axis::from_index(axis)))
            }
            _ => Err(YeeError::InvalidParity { half_cell: hc }),
        }
    }

    /// Slot 0..6 in E-then-H order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction of the component.
    pub fn axis(self) -> Axis {
        Axis::from_index(self.index() % 3)
    }

    /// Electric or magnetic.
    pub fn kind(self) -> FieldKind {
        if self.index() < 3 {
            FieldKind::Electric
        } else {
            FieldKind::Magnetic
        }
    }

    /// Half-cell parity (0 or 1 per axis) of this component.
    pub fn parity(self) -> [i64; 3] {
        let a = self.axis().index();
        let mut p = match self.kind() {
            FieldKind::Electric => [0; 3],
            FieldKind::Magnetic => [1; 3],
        };
        p[a] = 1 - p[a];
        p
    }

    /// Short name such as `"Ex"`.
    pub fn name(self) -> &'static str {
        ["Ex", "Ey", "Ez", "Hx", "Hy", "Hz"][self.index()]
    }
}

impl std::fmt::Display for FieldDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive box of half-cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HalfCellRect {
    /// Low corner, inclusive.
    pub lo: HalfCell,
    /// High corner, inclusive.
    pub hi: HalfCell,
}

pub(crate) fn first_with_parity(lo: i64, parity: i64) -> i64 {
    lo + (parity - lo).rem_euclid(2)
}

fn count_with_parity(lo: i64, hi: i64, parity: i64) -> usize {
    let first = first_with_parity(lo, parity);
    if first > hi {
        0
    } else {
        ((hi - first) / 2 + 1) as usize
    }
}

impl HalfCellRect {
    /// Box from inclusive corners.
    pub fn new(lo: HalfCell, hi: HalfCell) -> Self {
        HalfCellRect { lo, hi }
    }

    /// Box covering Yee cells `lo..hi` (exclusive end) on each axis.
    pub fn from_cells(lo: [usize; 3], hi: [usize; 3]) -> Self {
        HalfCellRect {
            lo: lo.map(|v| 2 * v as i64),
            hi: hi.map(|v| 2 * v as i64 - 1),
        }
    }

    /// True if the box holds no half-cell.
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.hi[a] < self.lo[a])
    }

    /// True if `hc` lies inside the box.
    pub fn contains(&self, hc: HalfCell) -> bool {
        (0..3).all(|a| hc[a] >= self.lo[a] && hc[a] <= self.hi[a])
    }

    /// Half-cell count along each axis.
    pub fn extent(&self) -> [i64; 3] {
        [0, 1, 2].map(|a| (self.hi[a] - self.lo[a] + 1).max(0))
    }

    /// Number of half-cells in the box with the given parity.
    pub fn count_with_parity(&self, parity: [i64; 3]) -> usize {
        (0..3)
            .map(|a| count_with_parity(self.lo[a], self.hi[a], parity[a]))
            .product()
    }

    /// Position of `hc` among same-parity half-cells of the box, x fastest.
    pub fn rank_with_parity(&self, hc: HalfCell) -> Option<usize> {
        if !self.contains(hc) {
            return None;
        }
        let parity = hc.map(|v| v.rem_euclid(2));
        let mut rank = 0usize;
        for a in (0..3).rev() {
            let n = count_with_parity(self.lo[a], self.hi[a], parity[a]);
            let r = ((hc[a] - first_with_parity(self.lo[a], parity[a])) / 2) as usize;
            rank = rank * n + r;
        }
        Some(rank)
    }
}

/// Identifier of a material assignment on the voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaintId(pub u32);

/// Read-only access to the painted partition.
pub trait PaintLookup: Sync {
    /// Number of Yee cells along each axis.
    fn num_yee_cells(&self) -> [usize; 3];

    /// Paint of a half-cell inside the partition, or `None` if unpainted or outside.
    fn paint_at(&self, hc: HalfCell) -> Option<PaintId>;

    /// Half-cells owned by the partition.
    fn half_cell_extent(&self) -> HalfCellRect {
        HalfCellRect::from_cells([0; 3], self.num_yee_cells())
    }
}

const NO_PAINT: u32 = u32::MAX;

/// A PML slab, edge or corner produced by [`VoxelGrid::paint_pml_border`].
#[derive(Debug, Clone, PartialEq)]
pub struct BorderRegion {
    /// Paint assigned to the region.
    pub paint: PaintId,
    /// Outward direction, one of the 26 nonzero `[-1..=1; 3]` vectors.
    pub direction: [i8; 3],
    /// Half-cells covered.
    pub rect: HalfCellRect,
}

/// Paint per half-cell over one partition.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    cells: [usize; 3],
    spacing: [f64; 3],
    strides: [usize; 3],
    paint: Box<[u32]>,
}

impl VoxelGrid {
    /// Create an unpainted grid.
    ///
    /// # Parameters
    /// - `cells`: Yee cells along each axis (each must be >= 1)
    /// - `spacing`: physical cell size along each axis (positive and finite)
    ///
    /// # Errors
    /// Returns an error if any parameter is invalid.
    pub fn new(cells: [usize; 3], spacing: [f64; 3]) -> Result<Self> {
        for (axis, &size) in cells.iter().enumerate() {
            if size == 0 {
                return Err(YeeError::InvalidGridShape { axis, size });
            }
        }
        for &h in &spacing {
            if !h.is_finite() || h <= 0.0 {
                return Err(YeeError::InvalidGridSpacing(h));
            }
        }
        let dims = cells.map(|n| 2 * n);
        let strides = [1, dims[0], dims[0] * dims[1]];
        let total = dims.iter().product();
        Ok(VoxelGrid {
            cells,
            spacing,
            strides,
            paint: vec![NO_PAINT; total].into_boxed_slice(),
        })
    }

    /// Create a grid painted uniformly with `paint`.
    ///
    /// # Errors
    /// Returns an error if the shape or spacing is invalid.
    pub fn uniform(cells: [usize; 3], spacing: [f64; 3], paint: PaintId) -> Result<Self> {
        let mut grid = VoxelGrid::new(cells, spacing)?;
        grid.paint.fill(paint.0);
        Ok(grid)
    }

    /// Build a grid from raw paint ids laid out x-fastest at half-cell resolution.
    /// `u32::MAX` marks an unpainted half-cell.
    ///
    /// # Errors
    /// Returns an error if the data length does not match the half-cell count.
    pub fn from_raw(cells: [usize; 3], spacing: [f64; 3], data: Vec<u32>) -> Result<Self> {
        let mut grid = VoxelGrid::new(cells, spacing)?;
        if data.len() != grid.paint.len() {
            return Err(YeeError::ShapeMismatch {
                expected: cells.map(|n| 2 * n).to_vec(),
                got: vec![data.len()],
            });
        }
        grid.paint = data.into_boxed_slice();
        Ok(grid)
    }

    /// Physical cell size along each axis.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Paint every half-cell of `rect` that lies in the partition.
    pub fn fill(&mut self, rect: HalfCellRect, paint: PaintId) {
        let ext = self.half_cell_extent();
        let lo = [0, 1, 2].map(|a| rect.lo[a].max(ext.lo[a]));
        let hi = [0, 1, 2].map(|a| rect.hi[a].min(ext.hi[a]));
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let flat = self.nd_to_flat([x, y, z]);
                    self.paint[flat] = paint.0;
                }
            }
        }
    }

    /// Paint Yee cells `lo..hi` (exclusive end).
    pub fn fill_cells(&mut self, lo: [usize; 3], hi: [usize; 3], paint: PaintId) {
        self.fill(HalfCellRect::from_cells(lo, hi), paint);
    }

    /// Paint a border of `thickness` cells as up to 26 slab/edge/corner regions.
    ///
    /// Paint ids are handed out sequentially from `first_paint`. Regions that
    /// would be empty (partition thinner than two borders) are skipped.
    pub fn paint_pml_border(&mut self, thickness: usize, first_paint: u32) -> Vec<BorderRegion> {
        let mut regions = Vec::new();
        let mut next = first_paint;
        for dz in -1i8..=1 {
            for dy in -1i8..=1 {
                for dx in -1i8..=1 {
                    let direction = [dx, dy, dz];
                    if direction == [0, 0, 0] {
                        continue;
                    }
                    let mut lo = [0usize; 3];
                    let mut hi = [0usize; 3];
                    for a in 0..3 {
                        let n = self.cells[a];
                        let t = thickness.min(n);
                        let (l, h) = match direction[a] {
                            -1 => (0, t),
                            1 => (n - t, n),
                            _ => (t, n.saturating_sub(t)),
                        };
                        lo[a] = l;
                        hi[a] = h;
                    }
                    if (0..3).any(|a| hi[a] <= lo[a]) {
                        continue;
                    }
                    let paint = PaintId(next);
                    next += 1;
                    let rect = HalfCellRect::from_cells(lo, hi);
                    self.fill(rect, paint);
                    regions.push(BorderRegion {
                        paint,
                        direction,
                        rect,
                    });
                }
            }
        }
        regions
    }

    /// Distinct paints present on the grid, in ascending order.
    pub fn paints(&self) -> Vec<PaintId> {
        let mut ids: Vec<u32> = self
            .paint
            .iter()
            .copied()
            .filter(|&p| p != NO_PAINT)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(PaintId).collect()
    }

    /// Raw paint ids, x fastest.
    pub fn raw(&self) -> &[u32] {
        &self.paint
    }

    /// Flat index of an in-partition half-cell.
    pub fn nd_to_flat(&self, hc: HalfCell) -> usize {
        let mut flat = 0;
        for d in 0..3 {
            flat += hc[d] as usize * self.strides[d];
        }
        flat
    }

    /// Half-cell of a flat index.
    pub fn flat_to_nd(&self, flat: usize) -> HalfCell {
        let mut idx = [0i64; 3];
        let mut remainder = flat;
        for d in (0..3).rev() {
            idx[d] = (remainder / self.strides[d]) as i64;
            remainder %= self.strides[d];
        }
        idx
    }
}

impl PaintLookup for VoxelGrid {
    fn num_yee_cells(&self) -> [usize; 3] {
        self.cells
    }

    fn paint_at(&self, hc: HalfCell) -> Option<PaintId> {
        if !self.half_cell_extent().contains(hc) {
            return None;
        }
        match self.paint[self.nd_to_flat(hc)] {
            NO_PAINT => None,
            p => Some(PaintId(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_decodes_components() {
        assert_eq!(FieldDir::from_half_cell([1, 0, 0]).unwrap(), FieldDir::Ex);
        assert_eq!(FieldDir::from_half_cell([2, 3, 4]).unwrap(), FieldDir::Ey);
        assert_eq!(FieldDir::from_half_cell([0, 0, -1]).unwrap(), FieldDir::Ez);
        assert_eq!(FieldDir::from_half_cell([0, 1, 1]).unwrap(), FieldDir::Hx);
        assert_eq!(FieldDir::from_half_cell([1, 2, 1]).unwrap(), FieldDir::Hy);
        assert_eq!(FieldDir::from_half_cell([1, 1, 0]).unwrap(), FieldDir::Hz);
    }

    #[test]
    fn invalid_parities_fail() {
        assert!(matches!(
            FieldDir::from_half_cell([0, 2, 4]),
            Err(YeeError::InvalidParity { .. })
        ));
        assert!(matches!(
            FieldDir::from_half_cell([1, 1, 1]),
            Err(YeeError::InvalidParity { .. })
        ));
    }

    #[test]
    fn parity_matches_decode() {
        for dir in FieldDir::ALL {
            assert_eq!(FieldDir::from_half_cell(dir.parity()).unwrap(), dir);
        }
    }

    #[test]
    fn cyclic_transverse_axes() {
        assert_eq!((Axis::X.j(), Axis::X.k()), (Axis::Y, Axis::Z));
        assert_eq!((Axis::Y.j(), Axis::Y.k()), (Axis::Z, Axis::X));
        assert_eq!((Axis::Z.j(), Axis::Z.k()), (Axis::X, Axis::Y));
    }

    #[test]
    fn rect_parity_counts_and_ranks() {
        let rect = HalfCellRect::from_cells([0, 0, 0], [3, 2, 2]);
        assert_eq!(rect.hi, [5, 3, 3]);
        assert_eq!(rect.count_with_parity(FieldDir::Ex.parity()), 3 * 2 * 2);
        assert_eq!(rect.rank_with_parity([1, 0, 0]), Some(0));
        assert_eq!(rect.rank_with_parity([3, 0, 0]), Some(1));
        assert_eq!(rect.rank_with_parity([1, 2, 0]), Some(3));
        assert_eq!(rect.rank_with_parity([1, 0, 2]), Some(6));
        assert_eq!(rect.rank_with_parity([7, 0, 0]), None);
    }

    #[test]
    fn odd_aligned_rect_counts() {
        let rect = HalfCellRect::new([1, 0, 0], [4, 0, 0]);
        assert_eq!(rect.count_with_parity([1, 0, 0]), 2);
        assert_eq!(rect.count_with_parity([0, 0, 0]), 2);
        assert_eq!(rect.rank_with_parity([2, 0, 0]), Some(0));
    }

    #[test]
    fn flat_nd_roundtrip() {
        let grid = VoxelGrid::new([3, 4, 2], [1.0; 3]).unwrap();
        for flat in 0..grid.raw().len() {
            assert_eq!(grid.nd_to_flat(grid.flat_to_nd(flat)), flat);
        }
    }

    #[test]
    fn fill_is_clamped_to_partition() {
        let mut grid = VoxelGrid::new([2, 2, 2], [1.0; 3]).unwrap();
        grid.fill(HalfCellRect::new([-5, -5, -5], [1, 1, 1]), PaintId(3));
        assert_eq!(grid.paint_at([0, 0, 0]), Some(PaintId(3)));
        assert_eq!(grid.paint_at([1, 1, 1]), Some(PaintId(3)));
        assert_eq!(grid.paint_at([2, 0, 0]), None);
        assert_eq!(grid.paint_at([-1, 0, 0]), None);
    }

    #[test]
    fn border_has_26_regions() {
        let mut grid = VoxelGrid::uniform([8, 8, 8], [1.0; 3], PaintId(0)).unwrap();
        let regions = grid.paint_pml_border(2, 10);
        assert_eq!(regions.len(), 26);
        assert_eq!(grid.paints().len(), 27);
        let corner = regions
            .iter()
            .find(|r| r.direction == [1, 1, 1])
            .unwrap();
        assert_eq!(corner.rect, HalfCellRect::from_cells([6, 6, 6], [8, 8, 8]));
        assert_eq!(grid.paint_at([15, 15, 15]), Some(corner.paint));
        assert_eq!(grid.paint_at([8, 8, 8]), Some(PaintId(0)));
    }

    #[test]
    fn invalid_shapes_rejected() {
        assert!(matches!(
            VoxelGrid::new([4, 0, 4], [1.0; 3]),
            Err(YeeError::InvalidGridShape { axis: 1, size: 0 })
        ));
        assert!(matches!(
            VoxelGrid::new([4, 4, 4], [1.0, -1.0, 1.0]),
            Err(YeeError::InvalidGridSpacing(_))
        ));
    }
}
