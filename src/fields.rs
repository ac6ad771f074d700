// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::buffer::{BufferId, BufferPointer, BufferRegistry};
use crate::error::{Result, YeeError};
use crate::grid::{FieldDir, FieldKind, HalfCell};
use crate::material::{EPS0, MU0};

/// Maps half-cells to offsets inside the six field-component buffers.
///
/// Every component buffer covers the partition plus a ghost shell of `halo`
/// cells per side, laid out x fastest. Ghost samples are never updated and
/// stay zero.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    cells: [usize; 3],
    halo: [usize; 3],
    dims: [usize; 3],
    strides: [usize; 3],
    buffers: [BufferId; 6],
}

impl FieldLayout {
    /// Layout with a one-cell ghost shell on every side.
    pub fn new(cells: [usize; 3], registry: &mut BufferRegistry) -> Self {
        Self::with_halo(cells, [1, 1, 1], registry)
    }

    /// Layout with a custom ghost shell per axis.
    pub fn with_halo(cells: [usize; 3], halo: [usize; 3], registry: &mut BufferRegistry) -> Self {
        let dims = [0, 1, 2].map(|a| cells[a] + 2 * halo[a]);
        let strides = [1, dims[0], dims[0] * dims[1]];
        let len = dims.iter().product();
        let buffers = FieldDir::ALL.map(|dir| registry.register(dir.name(), len, 1));
        FieldLayout {
            cells,
            halo,
            dims,
            strides,
            buffers,
        }
    }

    /// Yee cells of the partition.
    pub fn cells(&self) -> [usize; 3] {
        self.cells
    }

    /// Ghost cells per side.
    pub fn halo(&self) -> [usize; 3] {
        self.halo
    }

    /// Stored samples per component.
    pub fn component_len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Registry id of a component buffer.
    pub fn buffer(&self, dir: FieldDir) -> BufferId {
        self.buffers[dir.index()]
    }

    /// Offset of a half-cell inside its component buffer, if it is stored.
    pub fn offset(&self, hc: HalfCell) -> Option<usize> {
        let mut flat = 0;
        for a in 0..3 {
            let cell = hc[a].div_euclid(2) + self.halo[a] as i64;
            if cell < 0 || cell >= self.dims[a] as i64 {
                return None;
            }
            flat += cell as usize * self.strides[a];
        }
        Some(flat)
    }

    /// Checked pointer to the sample stored at a half-cell.
    ///
    /// # Errors
    /// Returns an error for invalid parity or half-cells outside the ghost shell.
    pub fn pointer(&self, registry: &BufferRegistry, hc: HalfCell) -> Result<BufferPointer> {
        let dir = FieldDir::from_half_cell(hc)?;
        let offset = self
            .offset(hc)
            .ok_or(YeeError::OutsidePartition { half_cell: hc })?;
        registry.pointer(self.buffer(dir), offset)
    }

    /// Half-cell of a component sample, the inverse of [`FieldLayout::offset`].
    pub fn half_cell_of(&self, dir: FieldDir, offset: usize) -> HalfCell {
        let parity = dir.parity();
        let mut hc = [0i64; 3];
        let mut remainder = offset;
        for a in (0..3).rev() {
            let cell = (remainder / self.strides[a]) as i64 - self.halo[a] as i64;
            remainder %= self.strides[a];
            hc[a] = 2 * cell + parity[a];
        }
        hc
    }
}

/// Backing storage for the E and H arenas.
///
/// Each arena holds the three components of one field back to back, matching
/// the address range reserved for them in the registry.
#[derive(Debug)]
pub struct FieldStorage {
    e: Vec<f32>,
    h: Vec<f32>,
    e_base: usize,
    h_base: usize,
    component_len: usize,
}

impl FieldStorage {
    /// Bind the component buffers of `layout` and allocate zeroed arenas.
    ///
    /// # Errors
    /// Returns an error if the layout buffers are no longer registered.
    pub fn allocate(layout: &FieldLayout, registry: &mut BufferRegistry) -> Result<Self> {
        let len = layout.component_len();
        let e_ids = [FieldDir::Ex, FieldDir::Ey, FieldDir::Ez].map(|d| layout.buffer(d));
        let h_ids = [FieldDir::Hx, FieldDir::Hy, FieldDir::Hz].map(|d| layout.buffer(d));
        let e_base = registry.reserve(&e_ids)?;
        let h_base = registry.reserve(&h_ids)?;
        Ok(FieldStorage {
            e: vec![0.0; 3 * len],
            h: vec![0.0; 3 * len],
            e_base,
            h_base,
            component_len: len,
        })
    }

    /// Index of a pointer's sample inside its field arena.
    ///
    /// # Errors
    /// Returns an error if the pointer does not resolve into either arena.
    pub fn arena_index(&self, registry: &BufferRegistry, ptr: BufferPointer) -> Result<usize> {
        let address = registry.address(ptr)?;
        let span = 3 * self.component_len;
        if address >= self.e_base && address < self.e_base + span {
            Ok(address - self.e_base)
        } else if address >= self.h_base && address < self.h_base + span {
            Ok(address - self.h_base)
        } else {
            Err(YeeError::Other(format!(
                "address {} ({}) is not inside a field arena",
                address,
                registry.identify(address)
            )))
        }
    }

    /// Flat address of an arena index, for diagnostics.
    pub fn address_of(&self, kind: FieldKind, index: usize) -> usize {
        match kind {
            FieldKind::Electric => self.e_base + index,
            FieldKind::Magnetic => self.h_base + index,
        }
    }

    /// E arena.
    pub fn e(&self) -> &[f32] {
        &self.e
    }

    /// H arena.
    pub fn h(&self) -> &[f32] {
        &self.h
    }

    /// Both arenas, E writable.
    pub fn e_phase(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.e, &self.h)
    }

    /// Both arenas, H writable.
    pub fn h_phase(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.h, &self.e)
    }

    /// Arena holding components of `kind`.
    pub fn arena_mut(&mut self, kind: FieldKind) -> &mut [f32] {
        match kind {
            FieldKind::Electric => &mut self.e,
            FieldKind::Magnetic => &mut self.h,
        }
    }

    /// Samples of one component.
    pub fn component(&self, dir: FieldDir) -> &[f32] {
        let start = (dir.index() % 3) * self.component_len;
        let arena = match dir.kind() {
            FieldKind::Electric => &self.e,
            FieldKind::Magnetic => &self.h,
        };
        &arena[start..start + self.component_len]
    }

    /// Arena index of a half-cell sample.
    fn index_of(&self, layout: &FieldLayout, hc: HalfCell) -> Result<(FieldKind, usize)> {
        let dir = FieldDir::from_half_cell(hc)?;
        let offset = layout
            .offset(hc)
            .ok_or(YeeError::OutsidePartition { half_cell: hc })?;
        Ok((dir.kind(), (dir.index() % 3) * self.component_len + offset))
    }

    /// Sample at a half-cell.
    ///
    /// # Errors
    /// Returns an error for invalid parity or half-cells outside the ghost shell.
    pub fn value(&self, layout: &FieldLayout, hc: HalfCell) -> Result<f32> {
        let (kind, index) = self.index_of(layout, hc)?;
        Ok(match kind {
            FieldKind::Electric => self.e[index],
            FieldKind::Magnetic => self.h[index],
        })
    }

    /// Overwrite the sample at a half-cell.
    ///
    /// # Errors
    /// Returns an error for invalid parity or half-cells outside the ghost shell.
    pub fn set_value(&mut self, layout: &FieldLayout, hc: HalfCell, value: f32) -> Result<()> {
        let (kind, index) = self.index_of(layout, hc)?;
        self.arena_mut(kind)[index] = value;
        Ok(())
    }

    /// Zero both arenas.
    pub fn clear(&mut self) {
        self.e.fill(0.0);
        self.h.fill(0.0);
    }

    /// Vacuum-weighted field energy density summed over samples, `(ε0 E² + μ0 H²)/2`.
    pub fn energy(&self) -> f64 {
        let e2: f64 = self.e.iter().map(|&v| (v as f64) * (v as f64)).sum();
        let h2: f64 = self.h.iter().map(|&v| (v as f64) * (v as f64)).sum();
        0.5 * (EPS0 * e2 + MU0 * h2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_shell_is_addressable() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([4, 3, 2], &mut reg);
        assert_eq!(layout.component_len(), 6 * 5 * 4);
        // Hz at x = -1 half-cell lives in the low ghost layer.
        assert_eq!(layout.offset([-1, 1, 0]), Some(6 + 30));
        assert!(layout.offset([-3, 1, 0]).is_none());
        assert!(layout.offset([9, 1, 0]).is_some());
        assert!(layout.offset([11, 1, 0]).is_none());
    }

    #[test]
    fn half_cell_of_inverts_offset() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([3, 3, 3], &mut reg);
        for hc in [[1, 0, 0], [0, 1, 1], [4, 5, 3], [-1, 0, 1], [6, 6, 5]] {
            let dir = FieldDir::from_half_cell(hc).unwrap();
            let off = layout.offset(hc).unwrap();
            assert_eq!(layout.half_cell_of(dir, off), hc);
        }
    }

    #[test]
    fn adjacent_same_component_is_contiguous() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([5, 5, 5], &mut reg);
        let a = layout.offset([1, 2, 2]).unwrap();
        let b = layout.offset([3, 2, 2]).unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn storage_resolves_pointers_into_arenas() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([2, 2, 2], &mut reg);
        let ptr = layout.pointer(&reg, [0, 1, 0]).unwrap();
        let mut fields = FieldStorage::allocate(&layout, &mut reg).unwrap();
        let len = layout.component_len();
        let idx = fields.arena_index(&reg, ptr).unwrap();
        assert_eq!(idx, len + layout.offset([0, 1, 0]).unwrap());

        fields.set_value(&layout, [0, 1, 0], 2.5).unwrap();
        assert_eq!(fields.e()[idx], 2.5);
        assert_eq!(fields.value(&layout, [0, 1, 0]).unwrap(), 2.5);
        assert_eq!(
            reg.identify(fields.address_of(FieldKind::Electric, idx)),
            format!("Ey[{}]", ptr.offset())
        );
    }

    #[test]
    fn energy_counts_both_fields() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([2, 2, 2], &mut reg);
        let mut fields = FieldStorage::allocate(&layout, &mut reg).unwrap();
        assert_eq!(fields.energy(), 0.0);
        fields.set_value(&layout, [1, 0, 0], 1.0).unwrap();
        assert!((fields.energy() - 0.5 * EPS0).abs() < 1e-24);
        fields.clear();
        assert_eq!(fields.energy(), 0.0);
    }
}
