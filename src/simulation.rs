// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::buffer::BufferRegistry;
use crate::current::StreamedCurrent;
use crate::error::{Result, YeeError};
use crate::fields::{FieldLayout, FieldStorage};
use crate::grid::{Axis, FieldKind, HalfCell, HalfCellRect, PaintId, PaintLookup, VoxelGrid};
use crate::material::{
    Discretization, DrudeMetal, MaterialModel, MaterialSpec, PerfectConductor, StaticDielectric,
};
use crate::pml::{create_pml, PmlParams};
use crate::runline::{AuxRegions, ContinuityConfig, RunlineCompiler};
use crate::source::FieldSource;
use crate::update::{FieldUpdater, NullForcing, UpdateEquation};

/// Progress information passed to the optional callback.
pub struct ProgressInfo {
    /// Timesteps completed so far.
    pub timestep: u64,
    /// Timesteps requested by the current `run` call.
    pub target: u64,
    /// Elapsed time since the run started.
    pub elapsed: Duration,
}

/// A PML region attached to a paint.
#[derive(Debug, Clone, PartialEq)]
pub struct PmlRegion {
    /// Outward normal of the boundary piece.
    pub direction: [i8; 3],
    /// Half-cells covered by the region.
    pub rect: HalfCellRect,
    /// Grading parameters.
    pub params: PmlParams,
}

#[derive(Debug, Clone)]
struct PaintEntry {
    name: String,
    spec: MaterialSpec,
    pml: Option<PmlRegion>,
}

/// Collects the painted grid, per-paint materials, boundaries and
/// excitations, then compiles everything into a [`Simulation`].
pub struct SimulationBuilder {
    grid: VoxelGrid,
    disc: Discretization,
    halo: [usize; 3],
    continuity: ContinuityConfig,
    num_threads: Option<usize>,
    paints: BTreeMap<PaintId, PaintEntry>,
    border: Option<usize>,
    sources: Vec<FieldSource>,
    currents: BTreeMap<PaintId, StreamedCurrent>,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl SimulationBuilder {
    /// Start from a painted grid and a timestep.
    ///
    /// # Errors
    /// Returns an error if the timestep is not positive and finite.
    pub fn new(grid: VoxelGrid, dt: f64) -> Result<Self> {
        let disc = Discretization::new(dt, grid.spacing())?;
        Ok(Self::with_discretization(grid, disc))
    }

    /// Start from a painted grid with the timestep at `courant` times the 3-D
    /// vacuum stability limit.
    ///
    /// # Errors
    /// Returns an error if `courant` is not positive and finite.
    pub fn from_courant(grid: VoxelGrid, courant: f64) -> Result<Self> {
        let disc = Discretization::from_courant(courant, grid.spacing())?;
        Ok(Self::with_discretization(grid, disc))
    }

    fn with_discretization(grid: VoxelGrid, disc: Discretization) -> Self {
        SimulationBuilder {
            grid,
            disc,
            halo: [1, 1, 1],
            continuity: ContinuityConfig::default(),
            num_threads: None,
            paints: BTreeMap::new(),
            border: None,
            sources: Vec::new(),
            currents: BTreeMap::new(),
            progress_callback: None,
        }
    }

    /// The painted grid.
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Timestep and spacing in use.
    pub fn discretization(&self) -> Discretization {
        self.disc
    }

    /// Bind a material to a paint (builder method).
    pub fn with_material(mut self, paint: PaintId, name: impl Into<String>, spec: MaterialSpec) -> Self {
        self.paints.insert(
            paint,
            PaintEntry {
                name: name.into(),
                spec,
                pml: None,
            },
        );
        self
    }

    /// Bind a material wrapped in a PML to a paint (builder method).
    pub fn with_pml_material(
        mut self,
        paint: PaintId,
        name: impl Into<String>,
        spec: MaterialSpec,
        region: PmlRegion,
    ) -> Self {
        self.paints.insert(
            paint,
            PaintEntry {
                name: name.into(),
                spec,
                pml: Some(region),
            },
        );
        self
    }

    /// Paint a PML border of `thickness` cells around the grid and bind every
    /// slab, edge and corner to `background` (builder method).
    ///
    /// `build` rejects a border that leaves no interior on some axis.
    pub fn with_pml_border(mut self, thickness: usize, background: MaterialSpec, params: PmlParams) -> Self {
        if thickness == 0 {
            return self;
        }
        self.border = Some(self.border.map_or(thickness, |t| t.max(thickness)));
        let first = self.grid.paints().last().map_or(0, |p| p.0 + 1);
        for region in self.grid.paint_pml_border(thickness, first) {
            let name = format!("pml{:?}", region.direction);
            self.paints.insert(
                region.paint,
                PaintEntry {
                    name,
                    spec: background.clone(),
                    pml: Some(PmlRegion {
                        direction: region.direction,
                        rect: region.rect,
                        params,
                    }),
                },
            );
        }
        self
    }

    /// Set the runline continuity predicates (builder method).
    pub fn with_continuity(mut self, continuity: ContinuityConfig) -> Self {
        self.continuity = continuity;
        self
    }

    /// Set the ghost shell width per axis (builder method). Default is one cell.
    pub fn with_halo(mut self, halo: [usize; 3]) -> Self {
        self.halo = halo;
        self
    }

    /// Set the number of setup threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Add a field source (builder method).
    pub fn with_source(mut self, source: FieldSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Impress a current on every sample of `paint` (builder method).
    /// A later current for the same paint replaces the earlier one.
    pub fn with_current(mut self, paint: PaintId, current: StreamedCurrent) -> Self {
        self.currents.insert(paint, current);
        self
    }

    /// Set a progress callback invoked roughly every 500ms during `run` (builder method).
    pub fn with_progress(mut self, callback: Box<dyn Fn(ProgressInfo) + Send + Sync>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn validate(&self, painted: &[PaintId]) -> Result<()> {
        for paint in painted {
            if !self.paints.contains_key(paint) {
                return Err(YeeError::UnknownPaint(paint.0));
            }
        }
        for entry in self.paints.values() {
            entry.spec.validate()?;
            if let Some(pml) = &entry.pml {
                pml.params.validate()?;
            }
        }
        if let Some(thickness) = self.border {
            let cells = self.grid.num_yee_cells();
            if cells.iter().any(|&n| 2 * thickness >= n) {
                return Err(YeeError::InvalidConfig(format!(
                    "PML border of {} cells leaves no interior in a {:?} grid",
                    thickness, cells
                )));
            }
        }
        let has_pml = self.paints.values().any(|e| e.pml.is_some());
        let c = &self.continuity;
        if has_pml && !(c.material && c.neighbor_aux && c.line) {
            return Err(YeeError::InvalidConfig(
                "PML paints require material, aux and line continuity".to_string(),
            ));
        }
        for paint in self.currents.keys() {
            if !self.paints.contains_key(paint) {
                return Err(YeeError::UnknownPaint(paint.0));
            }
        }
        Ok(())
    }

    /// Compile runlines, allocate storage and build one updater per paint.
    ///
    /// # Errors
    /// Returns an error for unbound paints, invalid materials, PML parameters
    /// or attenuation, a border without interior, PML paints outside their
    /// region, inconsistent continuity settings, or sources outside the grid.
    pub fn build(mut self) -> Result<Simulation> {
        let painted = self.grid.paints();
        self.validate(&painted)?;

        let start = Instant::now();
        let mut registry = BufferRegistry::new();
        let layout = FieldLayout::with_halo(self.grid.num_yee_cells(), self.halo, &mut registry);

        let mut aux = AuxRegions::new();
        for (&paint, entry) in &self.paints {
            if let Some(pml) = &entry.pml {
                aux.insert(paint, pml.rect);
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.get_num_threads())
            .build()
            .map_err(|e| YeeError::Other(e.to_string()))?;
        let mut buckets = RunlineCompiler::new(&self.grid, &layout, &registry, &aux, self.continuity)
            .compile(Some(&pool))?;

        let fields = FieldStorage::allocate(&layout, &mut registry)?;

        let mut updaters: Vec<Box<dyn FieldUpdater>> = Vec::new();
        for (paint, entry) in &self.paints {
            let Some(runlines) = buckets.remove(paint) else {
                debug!(paint = paint.0, name = %entry.name, "paint has no runlines, skipping");
                continue;
            };
            let current = self.currents.remove(paint);
            let mut updater = build_updater(entry, current, self.disc)?;
            updater.setup_runlines(runlines);
            updater.allocate_aux_buffers(&mut registry, &fields)?;
            updaters.push(updater);
        }

        for source in &mut self.sources {
            source.bind(&layout)?;
        }

        let runlines: usize = updaters.iter().map(|u| u.runline_count()).sum();
        info!(
            cells = ?self.grid.num_yee_cells(),
            dt = self.disc.dt,
            updaters = updaters.len(),
            runlines,
            sources = self.sources.len(),
            elapsed = ?start.elapsed(),
            "simulation ready"
        );

        Ok(Simulation {
            grid: self.grid,
            disc: self.disc,
            layout,
            registry,
            fields,
            updaters,
            sources: self.sources,
            timestep: 0,
            progress_callback: self.progress_callback,
        })
    }
}

fn compose<M: MaterialModel + 'static>(
    entry: &PaintEntry,
    material: M,
    current: Option<StreamedCurrent>,
    disc: Discretization,
) -> Result<Box<dyn FieldUpdater>> {
    let name = entry.name.as_str();
    match (&entry.pml, current) {
        (Some(p), Some(c)) => create_pml(name, material, c, p.direction, p.rect, &p.params, disc),
        (Some(p), None) => create_pml(name, material, NullForcing, p.direction, p.rect, &p.params, disc),
        (None, Some(c)) => Ok(Box::new(UpdateEquation::new(name, material, NullForcing, c))),
        (None, None) => Ok(Box::new(UpdateEquation::new(name, material, NullForcing, NullForcing))),
    }
}

fn build_updater(
    entry: &PaintEntry,
    current: Option<StreamedCurrent>,
    disc: Discretization,
) -> Result<Box<dyn FieldUpdater>> {
    match entry.spec {
        MaterialSpec::Pec => compose(entry, PerfectConductor, current, disc),
        MaterialSpec::Dielectric { eps_r, mu_r, sigma } => {
            compose(entry, StaticDielectric::new(eps_r, mu_r, sigma, disc), current, disc)
        }
        MaterialSpec::Drude {
            eps_inf,
            omega_p,
            tau,
        } => compose(
            entry,
            DrudeMetal::new(entry.name.clone(), eps_inf, omega_p, tau, disc),
            current,
            disc,
        ),
    }
}

/// A compiled partition ready to be stepped.
pub struct Simulation {
    grid: VoxelGrid,
    disc: Discretization,
    layout: FieldLayout,
    registry: BufferRegistry,
    fields: FieldStorage,
    updaters: Vec<Box<dyn FieldUpdater>>,
    sources: Vec<FieldSource>,
    timestep: u64,
    progress_callback: Option<Box<dyn Fn(ProgressInfo) + Send + Sync>>,
}

impl Simulation {
    /// Advance one timestep: E-phase, E sources, H-phase, H sources.
    ///
    /// # Errors
    /// Returns an error if an input stream fails; fields are left mid-step.
    pub fn step(&mut self) -> Result<()> {
        let n = self.timestep;
        for updater in &mut self.updaters {
            updater.prepare_timestep(n)?;
        }

        {
            let (e, h) = self.fields.e_phase();
            for axis in Axis::ALL {
                for updater in &mut self.updaters {
                    updater.calc_e_phase(axis, e, h);
                }
            }
        }
        self.apply_sources(n, FieldKind::Electric)?;

        {
            let (h, e) = self.fields.h_phase();
            for axis in Axis::ALL {
                for updater in &mut self.updaters {
                    updater.calc_h_phase(axis, h, e);
                }
            }
        }
        self.apply_sources(n, FieldKind::Magnetic)?;

        self.timestep += 1;
        trace!(timestep = n, "step complete");
        Ok(())
    }

    fn apply_sources(&mut self, timestep: u64, kind: FieldKind) -> Result<()> {
        for source in self.sources.iter_mut().filter(|s| s.kind() == kind) {
            source.apply(timestep, self.fields.arena_mut(kind))?;
        }
        Ok(())
    }

    /// Advance `steps` timesteps.
    ///
    /// # Errors
    /// Returns the first step error.
    pub fn run(&mut self, steps: u64) -> Result<()> {
        let start = Instant::now();
        let mut last_report = Duration::ZERO;
        let target = self.timestep + steps;
        for _ in 0..steps {
            self.step()?;
            if let Some(cb) = &self.progress_callback {
                let elapsed = start.elapsed();
                if elapsed >= last_report + Duration::from_millis(500) {
                    last_report = elapsed;
                    cb(ProgressInfo {
                        timestep: self.timestep,
                        target,
                        elapsed,
                    });
                }
            }
        }
        info!(steps, timestep = self.timestep, elapsed = ?start.elapsed(), "run complete");
        Ok(())
    }

    /// Timesteps completed.
    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    /// Timestep and spacing.
    pub fn discretization(&self) -> Discretization {
        self.disc
    }

    /// The painted grid.
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Field sample layout.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Registry of every field and auxiliary buffer.
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// Field storage.
    pub fn fields(&self) -> &FieldStorage {
        &self.fields
    }

    /// Field storage, writable for initial conditions.
    pub fn fields_mut(&mut self) -> &mut FieldStorage {
        &mut self.fields
    }

    /// Sample at a half-cell.
    ///
    /// # Errors
    /// Returns an error for invalid parity or half-cells outside storage.
    pub fn value(&self, hc: HalfCell) -> Result<f32> {
        self.fields.value(&self.layout, hc)
    }

    /// Vacuum-weighted field energy over all stored samples.
    pub fn field_energy(&self) -> f64 {
        self.fields.energy()
    }

    /// Names of the material updaters, in paint order.
    pub fn updater_names(&self) -> Vec<&str> {
        self.updaters.iter().map(|u| u.name()).collect()
    }

    /// Write every material's runlines with the buffers they touch.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn print_runlines(&self, out: &mut dyn Write) -> Result<()> {
        for updater in &self.updaters {
            updater.print_runlines(out, &self.fields, &self.registry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runline::NeighborContinuity;
    use crate::source::{BufferedSamples, SampleWindow};

    fn vacuum_grid(n: usize) -> VoxelGrid {
        VoxelGrid::uniform([n; 3], [1e-3; 3], PaintId(0)).unwrap()
    }

    #[test]
    fn unbound_paint_rejected() {
        let mut grid = vacuum_grid(4);
        grid.fill_cells([0; 3], [1; 3], PaintId(3));
        let result = SimulationBuilder::from_courant(grid, 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .build();
        assert!(matches!(result, Err(YeeError::UnknownPaint(3))));
    }

    #[test]
    fn pml_requires_line_continuity() {
        let config = ContinuityConfig {
            line: false,
            neighbor_fields: NeighborContinuity::Curl,
            ..ContinuityConfig::default()
        };
        let result = SimulationBuilder::from_courant(vacuum_grid(8), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_pml_border(2, MaterialSpec::vacuum(), PmlParams::default())
            .with_continuity(config)
            .build();
        assert!(matches!(result, Err(YeeError::InvalidConfig(_))));
    }

    #[test]
    fn border_creates_one_updater_per_region() {
        let sim = SimulationBuilder::from_courant(vacuum_grid(8), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_pml_border(2, MaterialSpec::vacuum(), PmlParams::default())
            .with_threads(2)
            .build()
            .unwrap();
        let names = sim.updater_names();
        assert_eq!(names.len(), 27);
        assert_eq!(names[0], "vacuum");
        assert!(names.contains(&"pml[1, 1, 1]"));
        assert!(sim.registry().live_buffers().any(|(_, b)| b.name().starts_with("PML[1, 0, 0] Phi")));
    }

    #[test]
    fn border_without_interior_rejected() {
        let result = SimulationBuilder::from_courant(vacuum_grid(3), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_pml_border(2, MaterialSpec::vacuum(), PmlParams::default())
            .build();
        assert!(matches!(result, Err(YeeError::InvalidConfig(_))));

        let result = SimulationBuilder::from_courant(vacuum_grid(4), 0.9)
            .unwrap()
            .with_pml_border(2, MaterialSpec::vacuum(), PmlParams::default())
            .build();
        assert!(matches!(result, Err(YeeError::InvalidConfig(_))));
    }

    #[test]
    fn degenerate_pml_params_rejected() {
        let params = PmlParams {
            kappa_max: 0.0,
            ..PmlParams::default()
        };
        let result = SimulationBuilder::from_courant(vacuum_grid(12), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_pml_border(3, MaterialSpec::vacuum(), params)
            .build();
        assert!(matches!(result, Err(YeeError::InvalidConfig(_))));
    }

    #[test]
    fn pml_paint_outside_its_region_rejected() {
        let mut grid = vacuum_grid(8);
        grid.fill_cells([4, 0, 0], [7, 8, 8], PaintId(1));
        grid.fill_cells([7, 0, 0], [8, 1, 1], PaintId(1));
        let region = PmlRegion {
            direction: [1, 0, 0],
            rect: HalfCellRect::from_cells([4, 0, 0], [7, 8, 8]),
            params: PmlParams::default(),
        };
        let result = SimulationBuilder::from_courant(grid, 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_pml_material(PaintId(1), "slab", MaterialSpec::vacuum(), region)
            .build();
        assert!(matches!(result, Err(YeeError::InvalidConfig(_))));
    }

    #[test]
    fn quiet_grid_stays_quiet() {
        let mut sim = SimulationBuilder::from_courant(vacuum_grid(4), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .build()
            .unwrap();
        sim.run(5).unwrap();
        assert_eq!(sim.timestep(), 5);
        assert_eq!(sim.field_energy(), 0.0);
    }

    #[test]
    fn source_errors_surface_from_step() {
        let source = FieldSource::new(
            "short",
            FieldKind::Electric,
            [1.0, 0.0, 0.0],
            HalfCellRect::from_cells([1; 3], [2; 3]),
            Box::new(BufferedSamples::new(vec![1.0])),
        )
        .with_window(SampleWindow::new(0, 5));
        let mut sim = SimulationBuilder::from_courant(vacuum_grid(4), 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_source(source)
            .build()
            .unwrap();
        sim.step().unwrap();
        assert_eq!(sim.value([3, 2, 2]).unwrap(), 1.0);
        assert!(matches!(sim.step(), Err(YeeError::StreamExhausted { timestep: 1, .. })));
    }

    #[test]
    fn runline_dump_covers_every_updater() {
        let mut grid = vacuum_grid(3);
        grid.fill_cells([1, 1, 1], [2, 2, 2], PaintId(1));
        let sim = SimulationBuilder::from_courant(grid, 0.9)
            .unwrap()
            .with_material(PaintId(0), "vacuum", MaterialSpec::vacuum())
            .with_material(PaintId(1), "metal", MaterialSpec::Pec)
            .build()
            .unwrap();
        let mut out = Vec::new();
        sim.print_runlines(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("vacuum (dielectric):"));
        assert!(text.contains("metal (PEC): 6 runlines, 6 cells"));
    }
}
