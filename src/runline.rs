// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::buffer::{BufferPointer, BufferRegistry};
use crate::error::{Result, YeeError};
use crate::fields::{FieldLayout, FieldStorage};
use crate::grid::{first_with_parity, Axis, FieldDir, FieldKind, HalfCell, HalfCellRect, PaintId, PaintLookup};

/// A subset of the six neighbor slots of a field sample.
///
/// Slots, relative to a component along axis `i` with transverse axes `j, k`:
/// component `j` one half-cell below/above along `k`, component `k` one
/// half-cell below/above along `j`, and the sample's own component one full
/// cell below/above along `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeighborSet(u8);

impl NeighborSet {
    /// Component `j` at `k - 1`.
    pub const J_LO: NeighborSet = NeighborSet(1 << 0);
    /// Component `j` at `k + 1`.
    pub const J_HI: NeighborSet = NeighborSet(1 << 1);
    /// Component `k` at `j - 1`.
    pub const K_LO: NeighborSet = NeighborSet(1 << 2);
    /// Component `k` at `j + 1`.
    pub const K_HI: NeighborSet = NeighborSet(1 << 3);
    /// Own component at `i - 2`.
    pub const I_LO: NeighborSet = NeighborSet(1 << 4);
    /// Own component at `i + 2`.
    pub const I_HI: NeighborSet = NeighborSet(1 << 5);
    /// The four curl neighbors.
    pub const CURL: NeighborSet = NeighborSet(0b00_1111);
    /// All six slots.
    pub const ALL: NeighborSet = NeighborSet(0b11_1111);
    /// No slot.
    pub const EMPTY: NeighborSet = NeighborSet(0);

    /// Union of two sets.
    pub const fn union(self, other: NeighborSet) -> NeighborSet {
        NeighborSet(self.0 | other.0)
    }

    /// True if slot `slot` (0..6) is in the set.
    pub fn contains_slot(self, slot: usize) -> bool {
        self.0 & (1 << slot) != 0
    }
}

/// Which neighbor pointers must stay at a fixed offset while a run grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborContinuity {
    /// No neighbor check.
    None,
    /// The four transverse curl neighbors.
    Curl,
    /// The curl neighbors plus the own-component neighbors along the field axis.
    AllSix,
    /// An explicit subset.
    Mixed(NeighborSet),
}

impl NeighborContinuity {
    /// Slots checked by this setting.
    pub fn slots(self) -> NeighborSet {
        match self {
            NeighborContinuity::None => NeighborSet::EMPTY,
            NeighborContinuity::Curl => NeighborSet::CURL,
            NeighborContinuity::AllSix => NeighborSet::ALL,
            NeighborContinuity::Mixed(set) => set,
        }
    }
}

/// Independently switchable continuity predicates.
///
/// Own-field memory contiguity and an addressable curl stencil are always
/// required; these flags add checks on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityConfig {
    /// Neighbor-field offsets must advance in lock-step with the run.
    pub neighbor_fields: NeighborContinuity,
    /// Region-derived auxiliary indices must advance in lock-step with the run.
    pub neighbor_aux: bool,
    /// Every half-cell of a run carries the paint of its first half-cell.
    pub material: bool,
    /// A run never leaves the (y, z) row it started in.
    pub line: bool,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        ContinuityConfig {
            neighbor_fields: NeighborContinuity::Curl,
            neighbor_aux: true,
            material: true,
            line: true,
        }
    }
}

fn add(a: HalfCell, b: HalfCell) -> HalfCell {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scaled(axis: Axis, by: i64) -> HalfCell {
    axis.unit().map(|v| v * by)
}

/// Half-cell deltas of the six neighbor slots for a component along `axis`.
pub fn neighbor_deltas(axis: Axis) -> [HalfCell; 6] {
    let (j, k) = (axis.j(), axis.k());
    [
        scaled(k, -1),
        scaled(k, 1),
        scaled(j, -1),
        scaled(j, 1),
        scaled(axis, -2),
        scaled(axis, 2),
    ]
}

/// Paints whose cells carry position-derived auxiliary indices (PML regions).
#[derive(Debug, Clone, Default)]
pub struct AuxRegions {
    regions: BTreeMap<PaintId, HalfCellRect>,
}

impl AuxRegions {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a region to a paint.
    pub fn insert(&mut self, paint: PaintId, rect: HalfCellRect) {
        self.regions.insert(paint, rect);
    }

    /// Region of a paint.
    pub fn get(&self, paint: PaintId) -> Option<&HalfCellRect> {
        self.regions.get(&paint)
    }

    /// Aux index of a half-cell under `paint`, if the paint has a region containing it.
    pub fn aux_index(&self, paint: PaintId, hc: HalfCell) -> Option<usize> {
        self.regions.get(&paint)?.rank_with_parity(hc)
    }

    /// True if no region is registered.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// A committed run, expressed as buffer-relative pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupRunline {
    /// First half-cell.
    pub start: HalfCell,
    /// Number of samples.
    pub length: usize,
    /// Paint of the first half-cell.
    pub paint: PaintId,
    /// Sample being updated (`f_i`).
    pub field: BufferPointer,
    /// Component `j` at `k - 1` and `k + 1`.
    pub nbr_j: [BufferPointer; 2],
    /// Component `k` at `j - 1` and `j + 1`.
    pub nbr_k: [BufferPointer; 2],
    /// Auxiliary index of the first sample; assigned by the encoder when the
    /// paint has no aux region.
    pub aux_index: Option<usize>,
    /// Half-cell offsets of the first sample from the aux region's low corner.
    pub pml_depth: Option<[usize; 3]>,
}

impl SetupRunline {
    /// Component updated by this run.
    pub fn direction(&self) -> Result<FieldDir> {
        FieldDir::from_half_cell(self.start)
    }
}

/// Consumer of committed runs.
pub trait RunlineEncoder {
    /// Accept one run.
    fn encode(&mut self, runline: SetupRunline) -> Result<()>;
}

impl RunlineEncoder for Vec<SetupRunline> {
    fn encode(&mut self, runline: SetupRunline) -> Result<()> {
        self.push(runline);
        Ok(())
    }
}

/// Runs of one material, bucketed by component.
#[derive(Debug, Clone, Default)]
pub struct RunlineBuckets {
    runlines: [Vec<SetupRunline>; 6],
    cells: [usize; 6],
}

impl RunlineBuckets {
    /// Runs updating `dir`, in commit order.
    pub fn runlines(&self, dir: FieldDir) -> &[SetupRunline] {
        &self.runlines[dir.index()]
    }

    /// Samples of `dir` covered by this material.
    pub fn cell_count(&self, dir: FieldDir) -> usize {
        self.cells[dir.index()]
    }

    /// Samples covered across all components.
    pub fn total_cells(&self) -> usize {
        self.cells.iter().sum()
    }

    /// Number of runs across all components.
    pub fn total_runlines(&self) -> usize {
        self.runlines.iter().map(Vec::len).sum()
    }

    /// One past the largest aux index used by `dir`.
    pub fn aux_extent(&self, dir: FieldDir) -> usize {
        self.runlines[dir.index()]
            .iter()
            .map(|rl| rl.aux_index.unwrap_or(0) + rl.length)
            .max()
            .unwrap_or(0)
    }
}

impl RunlineEncoder for RunlineBuckets {
    fn encode(&mut self, mut runline: SetupRunline) -> Result<()> {
        let slot = runline.direction()?.index();
        if runline.aux_index.is_none() {
            runline.aux_index = Some(self.cells[slot]);
        }
        self.cells[slot] += runline.length;
        self.runlines[slot].push(runline);
        Ok(())
    }
}

impl RunlineEncoder for BTreeMap<PaintId, RunlineBuckets> {
    fn encode(&mut self, runline: SetupRunline) -> Result<()> {
        self.entry(runline.paint).or_default().encode(runline)
    }
}

#[derive(Debug, Clone)]
struct OpenRun {
    start: HalfCell,
    length: usize,
    paint: PaintId,
    dir: FieldDir,
    field_offset: usize,
    neighbors: [Option<usize>; 6],
    aux_start: Option<usize>,
}

/// Grows one run at a time, deciding continuation eagerly per half-cell.
pub struct RunlineBuilder<'a> {
    layout: &'a FieldLayout,
    registry: &'a BufferRegistry,
    aux_regions: &'a AuxRegions,
    config: ContinuityConfig,
    open: Option<OpenRun>,
}

impl<'a> RunlineBuilder<'a> {
    /// Builder with no open run.
    pub fn new(
        layout: &'a FieldLayout,
        registry: &'a BufferRegistry,
        aux_regions: &'a AuxRegions,
        config: ContinuityConfig,
    ) -> Self {
        RunlineBuilder {
            layout,
            registry,
            aux_regions,
            config,
            open: None,
        }
    }

    /// True while a run is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Length of the open run, zero if none.
    pub fn open_length(&self) -> usize {
        self.open.as_ref().map_or(0, |r| r.length)
    }

    fn neighbor_offsets(&self, dir: FieldDir, hc: HalfCell) -> [Option<usize>; 6] {
        neighbor_deltas(dir.axis()).map(|d| self.layout.offset(add(hc, d)))
    }

    fn stencil_mapped(&self, dir: FieldDir, hc: HalfCell) -> bool {
        self.layout.offset(hc).is_some()
            && self.neighbor_offsets(dir, hc)[..4]
                .iter()
                .all(Option::is_some)
    }

    /// True if `hc` has a component and an addressable curl stencil.
    pub fn can_start(&self, hc: HalfCell) -> bool {
        match FieldDir::from_half_cell(hc) {
            Ok(dir) => self.stencil_mapped(dir, hc),
            Err(_) => false,
        }
    }

    /// Seed a run at `first`.
    ///
    /// # Errors
    /// Returns an error for invalid parity, unpainted cells, an unaddressable
    /// stencil, or a paint whose aux region does not contain `first`.
    pub fn start_runline<G: PaintLookup + ?Sized>(&mut self, grid: &G, first: HalfCell) -> Result<()> {
        let dir = FieldDir::from_half_cell(first)?;
        let paint = grid
            .paint_at(first)
            .ok_or(YeeError::UnpaintedCell { half_cell: first })?;
        if !self.stencil_mapped(dir, first) {
            return Err(YeeError::OutsidePartition { half_cell: first });
        }
        let field_offset = self
            .layout
            .offset(first)
            .ok_or(YeeError::OutsidePartition { half_cell: first })?;
        let aux_start = self.aux_regions.aux_index(paint, first);
        if aux_start.is_none() && self.aux_regions.get(paint).is_some() {
            return Err(YeeError::InvalidConfig(format!(
                "paint {} covers {:?} outside its PML region",
                paint.0, first
            )));
        }
        self.open = Some(OpenRun {
            start: first,
            length: 1,
            paint,
            dir,
            field_offset,
            neighbors: self.neighbor_offsets(dir, first),
            aux_start,
        });
        Ok(())
    }

    /// Check whether the open run may absorb `next`, painted `paint_at_next`.
    pub fn can_continue_runline(&self, next: HalfCell, paint_at_next: PaintId) -> bool {
        let Some(run) = &self.open else {
            return false;
        };
        if FieldDir::from_half_cell(next).ok() != Some(run.dir) {
            return false;
        }
        let n = run.length;
        if self.layout.offset(next) != Some(run.field_offset + n) {
            return false;
        }
        let next_neighbors = self.neighbor_offsets(run.dir, next);
        if next_neighbors[..4].iter().any(Option::is_none) {
            return false;
        }

        let slots = self.config.neighbor_fields.slots();
        for slot in 0..6 {
            if slots.contains_slot(slot) {
                let expected = run.neighbors[slot].map(|o| o + n);
                if expected.is_none() || next_neighbors[slot] != expected {
                    return false;
                }
            }
        }

        if self.config.neighbor_aux {
            let aux = self.aux_regions.aux_index(paint_at_next, next);
            let continuous = match (run.aux_start, aux) {
                (None, None) => true,
                (Some(a0), Some(a)) => a == a0 + n,
                _ => false,
            };
            if !continuous {
                return false;
            }
        }

        if self.config.material && paint_at_next != run.paint {
            return false;
        }

        if self.config.line && (next[1] != run.start[1] || next[2] != run.start[2]) {
            return false;
        }

        true
    }

    /// Extend the open run by one sample. Call only after a successful
    /// [`RunlineBuilder::can_continue_runline`].
    pub fn continue_runline(&mut self) {
        if let Some(run) = &mut self.open {
            run.length += 1;
        }
    }

    /// Close the open run at `last` and hand it to `encoder`.
    ///
    /// # Errors
    /// Returns an error if no run is open, `last` is not the run's final
    /// sample, or the encoder rejects the run.
    pub fn end_runline<E: RunlineEncoder + ?Sized>(&mut self, last: HalfCell, encoder: &mut E) -> Result<()> {
        let run = self
            .open
            .take()
            .ok_or_else(|| YeeError::Other("end_runline called with no open run".to_string()))?;
        if self.layout.offset(last) != Some(run.field_offset + run.length - 1) {
            return Err(YeeError::Other(format!(
                "runline from {:?} does not end at {:?}",
                run.start, last
            )));
        }

        let pointer = |slot: usize| -> Result<BufferPointer> {
            let delta = neighbor_deltas(run.dir.axis())[slot];
            self.layout.pointer(self.registry, add(run.start, delta))
        };
        let field = self.layout.pointer(self.registry, run.start)?;
        let nbr_j = [pointer(0)?, pointer(1)?];
        let nbr_k = [pointer(2)?, pointer(3)?];

        let pml_depth = self.aux_regions.get(run.paint).map(|rect| {
            [0, 1, 2].map(|a| (run.start[a] - rect.lo[a]).max(0) as usize)
        });

        encoder.encode(SetupRunline {
            start: run.start,
            length: run.length,
            paint: run.paint,
            field,
            nbr_j,
            nbr_k,
            aux_index: run.aux_start,
            pml_depth,
        })
    }
}

/// Walks a painted partition and commits runs for every component.
///
/// Traversal follows x, the memory-contiguous axis. Cells are visited in
/// storage order per component, so every run advances its field and
/// neighbor offsets by exactly one per sample.
pub struct RunlineCompiler<'a, G: PaintLookup> {
    grid: &'a G,
    layout: &'a FieldLayout,
    registry: &'a BufferRegistry,
    aux_regions: &'a AuxRegions,
    config: ContinuityConfig,
}

impl<'a, G: PaintLookup> RunlineCompiler<'a, G> {
    /// Compiler over `grid` using `layout` offsets.
    pub fn new(
        grid: &'a G,
        layout: &'a FieldLayout,
        registry: &'a BufferRegistry,
        aux_regions: &'a AuxRegions,
        config: ContinuityConfig,
    ) -> Self {
        RunlineCompiler {
            grid,
            layout,
            registry,
            aux_regions,
            config,
        }
    }

    /// Commit the runs of one component, in storage order.
    ///
    /// Unpainted half-cells are skipped and never updated.
    ///
    /// # Errors
    /// Returns an error if a paint with an aux region covers a half-cell
    /// outside that region.
    pub fn compile_direction(&self, dir: FieldDir) -> Result<Vec<SetupRunline>> {
        let ext = self.grid.half_cell_extent();
        let parity = dir.parity();
        let start = [0, 1, 2].map(|a| first_with_parity(ext.lo[a], parity[a]));

        let mut builder = RunlineBuilder::new(self.layout, self.registry, self.aux_regions, self.config);
        let mut committed = Vec::new();
        let mut last = start;
        let mut skipped = 0usize;

        for z in (start[2]..=ext.hi[2]).step_by(2) {
            for y in (start[1]..=ext.hi[1]).step_by(2) {
                for x in (start[0]..=ext.hi[0]).step_by(2) {
                    let hc = [x, y, z];
                    let Some(paint) = self.grid.paint_at(hc) else {
                        if builder.is_open() {
                            builder.end_runline(last, &mut committed)?;
                        }
                        skipped += 1;
                        continue;
                    };

                    if builder.can_continue_runline(hc, paint) {
                        builder.continue_runline();
                        last = hc;
                        continue;
                    }
                    if builder.is_open() {
                        builder.end_runline(last, &mut committed)?;
                    }
                    if builder.can_start(hc) {
                        builder.start_runline(self.grid, hc)?;
                        last = hc;
                    } else {
                        skipped += 1;
                    }
                }
            }
        }
        if builder.is_open() {
            builder.end_runline(last, &mut committed)?;
        }

        debug!(
            direction = %dir,
            runlines = committed.len(),
            skipped,
            "compiled runlines"
        );
        Ok(committed)
    }

    /// Commit the runs of all six components and bucket them per paint.
    ///
    /// Components are compiled on `pool` when given; the merge order is fixed,
    /// so sequential aux indices do not depend on scheduling.
    ///
    /// # Errors
    /// Returns the first compile or encode error.
    pub fn compile(
        &self,
        pool: Option<&rayon::ThreadPool>,
    ) -> Result<BTreeMap<PaintId, RunlineBuckets>> {
        let per_direction: Vec<Result<Vec<SetupRunline>>> = match pool {
            Some(pool) => pool.install(|| {
                (0..6usize)
                    .into_par_iter()
                    .map(|i| self.compile_direction(FieldDir::ALL[i]))
                    .collect()
            }),
            None => FieldDir::ALL
                .iter()
                .map(|&dir| self.compile_direction(dir))
                .collect(),
        };

        let mut buckets: BTreeMap<PaintId, RunlineBuckets> = BTreeMap::new();
        for runs in per_direction {
            for runline in runs? {
                buckets.encode(runline)?;
            }
        }
        Ok(buckets)
    }
}

/// A run resolved to arena indices, consumed every timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runline {
    /// First half-cell, kept for diagnostics.
    pub start: HalfCell,
    /// Number of samples.
    pub length: usize,
    /// Arena index of the first updated sample.
    pub field: usize,
    /// Arena indices of component `j` at `k - 1` and `k + 1`.
    pub nbr_j: [usize; 2],
    /// Arena indices of component `k` at `j - 1` and `j + 1`.
    pub nbr_k: [usize; 2],
    /// Auxiliary index of the first sample.
    pub aux_index: usize,
    /// Half-cell offsets of the first sample inside its aux region.
    pub pml_depth: [usize; 3],
}

impl Runline {
    /// Resolve a setup run once storage exists.
    ///
    /// Every pointer is checked at both ends of the run.
    ///
    /// # Errors
    /// Returns an error if any pointer leaves its buffer or arena.
    pub fn resolve(
        setup: &SetupRunline,
        fields: &FieldStorage,
        registry: &BufferRegistry,
    ) -> Result<Runline> {
        let resolve = |ptr: BufferPointer| -> Result<usize> {
            if setup.length > 1 {
                ptr.advanced(registry, setup.length - 1)?;
            }
            fields.arena_index(registry, ptr)
        };
        let aux_index = setup.aux_index.ok_or_else(|| {
            YeeError::Other(format!(
                "runline at {:?} reached resolution without an aux index",
                setup.start
            ))
        })?;
        Ok(Runline {
            start: setup.start,
            length: setup.length,
            field: resolve(setup.field)?,
            nbr_j: [resolve(setup.nbr_j[0])?, resolve(setup.nbr_j[1])?],
            nbr_k: [resolve(setup.nbr_k[0])?, resolve(setup.nbr_k[1])?],
            aux_index,
            pml_depth: setup.pml_depth.unwrap_or([0; 3]),
        })
    }

    /// One-line description naming every buffer the run touches.
    pub fn describe(&self, fields: &FieldStorage, registry: &BufferRegistry) -> String {
        let (own, other) = match FieldDir::from_half_cell(self.start).map(FieldDir::kind) {
            Ok(FieldKind::Magnetic) => (FieldKind::Magnetic, FieldKind::Electric),
            _ => (FieldKind::Electric, FieldKind::Magnetic),
        };
        let name = |kind, index| registry.identify(fields.address_of(kind, index));
        format!(
            "{:?} x{}: field={} j=[{}, {}] k=[{}, {}] aux={} depth={:?}",
            self.start,
            self.length,
            name(own, self.field),
            name(other, self.nbr_j[0]),
            name(other, self.nbr_j[1]),
            name(other, self.nbr_k[0]),
            name(other, self.nbr_k[1]),
            self.aux_index,
            self.pml_depth
        )
    }
}
