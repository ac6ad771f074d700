// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Update-equation composition.
//!
//! An [`UpdateEquation`] glues one material formula to two additive forcing
//! contributors (PML correction and injected current) and walks the
//! material's runlines. Every combination is monomorphized; the only dynamic
//! dispatch is through [`FieldUpdater`], once per material per phase call.

use std::io::Write;

use tracing::debug;

use crate::buffer::BufferRegistry;
use crate::error::Result;
use crate::fields::FieldStorage;
use crate::grid::{Axis, AxisTag, FieldDir, XTag, YTag, ZTag};
use crate::material::MaterialModel;
use crate::runline::{Runline, RunlineBuckets};

/// Additive forcing fed to a material formula.
///
/// `update_j` returns the electric forcing `J` for the E-phase and `update_k`
/// the magnetic forcing `K` for the H-phase. Both receive the raw neighbor
/// differences `d_j` and `d_k` of the sample being updated.
pub trait ForcingModel: Send {
    /// State carried through one E-phase call.
    type LocalE;
    /// State carried through one H-phase call.
    type LocalH;

    /// Fresh E-phase state for component `D`.
    fn init_local_e<D: AxisTag>(&self) -> Self::LocalE;
    /// Called before the first sample of each E runline.
    fn on_start_runline_e<D: AxisTag>(&self, local: &mut Self::LocalE, runline: &Runline);
    /// Electric forcing for the current sample.
    fn update_j<D: AxisTag>(&mut self, local: &mut Self::LocalE, d_j: f32, d_k: f32) -> f32;
    /// Called after every E sample.
    fn after_update_e<D: AxisTag>(&self, local: &mut Self::LocalE);

    /// Fresh H-phase state for component `D`.
    fn init_local_h<D: AxisTag>(&self) -> Self::LocalH;
    /// Called before the first sample of each H runline.
    fn on_start_runline_h<D: AxisTag>(&self, local: &mut Self::LocalH, runline: &Runline);
    /// Magnetic forcing for the current sample.
    fn update_k<D: AxisTag>(&mut self, local: &mut Self::LocalH, d_j: f32, d_k: f32) -> f32;
    /// Called after every H sample.
    fn after_update_h<D: AxisTag>(&self, local: &mut Self::LocalH);

    /// Pull per-timestep inputs before the E-phase of `timestep`.
    ///
    /// # Errors
    /// Returns an error if an input stream fails.
    fn prepare_timestep(&mut self, _timestep: u64) -> Result<()> {
        Ok(())
    }

    /// Size auxiliary state from the compiled runlines.
    ///
    /// # Errors
    /// Returns [`crate::YeeError::SizeMismatch`] if existing state disagrees
    /// with the runlines.
    fn allocate_aux_buffers(&mut self, _registry: &mut BufferRegistry, _buckets: &RunlineBuckets) -> Result<()> {
        Ok(())
    }

    /// Short description for runline dumps, `None` for a no-op contributor.
    fn describe(&self) -> Option<String> {
        None
    }
}

/// Contributor that adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullForcing;

impl ForcingModel for NullForcing {
    type LocalE = ();
    type LocalH = ();

    fn init_local_e<D: AxisTag>(&self) {}
    fn on_start_runline_e<D: AxisTag>(&self, _local: &mut (), _runline: &Runline) {}
    #[inline(always)]
    fn update_j<D: AxisTag>(&mut self, _local: &mut (), _d_j: f32, _d_k: f32) -> f32 {
        0.0
    }
    #[inline(always)]
    fn after_update_e<D: AxisTag>(&self, _local: &mut ()) {}

    fn init_local_h<D: AxisTag>(&self) {}
    fn on_start_runline_h<D: AxisTag>(&self, _local: &mut (), _runline: &Runline) {}
    #[inline(always)]
    fn update_k<D: AxisTag>(&mut self, _local: &mut (), _d_j: f32, _d_k: f32) -> f32 {
        0.0
    }
    #[inline(always)]
    fn after_update_h<D: AxisTag>(&self, _local: &mut ()) {}
}

/// Object-safe face of a material's update equation.
pub trait FieldUpdater: Send {
    /// Name used in logs and dumps.
    fn name(&self) -> &str;

    /// Take ownership of the material's compiled runlines.
    fn setup_runlines(&mut self, buckets: RunlineBuckets);

    /// Resolve runlines against field storage and size all auxiliary state.
    ///
    /// # Errors
    /// Returns an error if a runline leaves field storage or auxiliary sizes disagree.
    fn allocate_aux_buffers(&mut self, registry: &mut BufferRegistry, fields: &FieldStorage) -> Result<()>;

    /// Pull per-timestep inputs.
    ///
    /// # Errors
    /// Returns an error if an input stream fails.
    fn prepare_timestep(&mut self, timestep: u64) -> Result<()>;

    /// Update E along `axis` from the current H.
    fn calc_e_phase(&mut self, axis: Axis, e: &mut [f32], h: &[f32]);

    /// Update H along `axis` from the current E.
    fn calc_h_phase(&mut self, axis: Axis, h: &mut [f32], e: &[f32]);

    /// Runlines across all components.
    fn runline_count(&self) -> usize;

    /// Samples updated per timestep.
    fn cell_count(&self) -> usize;

    /// Write every runline with the buffers it touches.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    fn print_runlines(&self, out: &mut dyn Write, fields: &FieldStorage, registry: &BufferRegistry) -> Result<()>;
}

/// Material `M` with PML forcing `P` and current forcing `C`.
pub struct UpdateEquation<M, P, C> {
    name: String,
    material: M,
    pml: P,
    current: C,
    setup: RunlineBuckets,
    runlines: [Vec<Runline>; 6],
}

impl<M, P, C> UpdateEquation<M, P, C>
where
    M: MaterialModel,
    P: ForcingModel,
    C: ForcingModel,
{
    /// Compose an update equation. Runlines are attached later.
    pub fn new(name: impl Into<String>, material: M, pml: P, current: C) -> Self {
        UpdateEquation {
            name: name.into(),
            material,
            pml,
            current,
            setup: RunlineBuckets::default(),
            runlines: Default::default(),
        }
    }

    /// The material formula.
    pub fn material(&self) -> &M {
        &self.material
    }

    /// The PML contributor.
    pub fn pml(&self) -> &P {
        &self.pml
    }

    /// Resolved runlines of one component.
    pub fn runlines(&self, dir: FieldDir) -> &[Runline] {
        &self.runlines[dir.index()]
    }

    fn e_phase<D: AxisTag>(&mut self, e: &mut [f32], h: &[f32]) {
        let runlines = &self.runlines[D::INDEX];
        if runlines.is_empty() {
            return;
        }
        let mut ml = self.material.init_local_e::<D>();
        let mut pl = self.pml.init_local_e::<D>();
        let mut cl = self.current.init_local_e::<D>();

        for rl in runlines {
            self.material.on_start_runline_e(&mut ml, rl);
            self.pml.on_start_runline_e::<D>(&mut pl, rl);
            self.current.on_start_runline_e::<D>(&mut cl, rl);

            let len = rl.length;
            let field = &mut e[rl.field..rl.field + len];
            let j_lo = &h[rl.nbr_j[0]..rl.nbr_j[0] + len];
            let j_hi = &h[rl.nbr_j[1]..rl.nbr_j[1] + len];
            let k_lo = &h[rl.nbr_k[0]..rl.nbr_k[0] + len];
            let k_hi = &h[rl.nbr_k[1]..rl.nbr_k[1] + len];

            for n in 0..len {
                let d_j = j_hi[n] - j_lo[n];
                let d_k = k_hi[n] - k_lo[n];
                let forcing = self.pml.update_j::<D>(&mut pl, d_j, d_k)
                    + self.current.update_j::<D>(&mut cl, d_j, d_k);
                field[n] = self.material.update_e::<D>(&mut ml, field[n], d_j, d_k, forcing);
                self.material.after_update_e(&mut ml);
                self.pml.after_update_e::<D>(&mut pl);
                self.current.after_update_e::<D>(&mut cl);
            }
        }
    }

    fn h_phase<D: AxisTag>(&mut self, h: &mut [f32], e: &[f32]) {
        let runlines = &self.runlines[3 + D::INDEX];
        if runlines.is_empty() {
            return;
        }
        let mut ml = self.material.init_local_h::<D>();
        let mut pl = self.pml.init_local_h::<D>();
        let mut cl = self.current.init_local_h::<D>();

        for rl in runlines {
            self.material.on_start_runline_h(&mut ml, rl);
            self.pml.on_start_runline_h::<D>(&mut pl, rl);
            self.current.on_start_runline_h::<D>(&mut cl, rl);

            let len = rl.length;
            let field = &mut h[rl.field..rl.field + len];
            let j_lo = &e[rl.nbr_j[0]..rl.nbr_j[0] + len];
            let j_hi = &e[rl.nbr_j[1]..rl.nbr_j[1] + len];
            let k_lo = &e[rl.nbr_k[0]..rl.nbr_k[0] + len];
            let k_hi = &e[rl.nbr_k[1]..rl.nbr_k[1] + len];

            for n in 0..len {
                let d_j = j_hi[n] - j_lo[n];
                let d_k = k_hi[n] - k_lo[n];
                let forcing = self.pml.update_k::<D>(&mut pl, d_j, d_k)
                    + self.current.update_k::<D>(&mut cl, d_j, d_k);
                field[n] = self.material.update_h::<D>(&mut ml, field[n], d_j, d_k, forcing);
                self.material.after_update_h(&mut ml);
                self.pml.after_update_h::<D>(&mut pl);
                self.current.after_update_h::<D>(&mut cl);
            }
        }
    }
}

impl<M, P, C> FieldUpdater for UpdateEquation<M, P, C>
where
    M: MaterialModel,
    P: ForcingModel,
    C: ForcingModel,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn setup_runlines(&mut self, buckets: RunlineBuckets) {
        self.setup = buckets;
        self.runlines = Default::default();
    }

    fn allocate_aux_buffers(&mut self, registry: &mut BufferRegistry, fields: &FieldStorage) -> Result<()> {
        for dir in FieldDir::ALL {
            self.runlines[dir.index()] = self
                .setup
                .runlines(dir)
                .iter()
                .map(|rl| Runline::resolve(rl, fields, registry))
                .collect::<Result<Vec<_>>>()?;
        }
        self.material.allocate_aux_buffers(registry, &self.setup)?;
        self.pml.allocate_aux_buffers(registry, &self.setup)?;
        self.current.allocate_aux_buffers(registry, &self.setup)?;
        debug!(
            updater = %self.name,
            material = self.material.name(),
            runlines = self.runline_count(),
            cells = self.cell_count(),
            "resolved runlines"
        );
        Ok(())
    }

    fn prepare_timestep(&mut self, timestep: u64) -> Result<()> {
        self.pml.prepare_timestep(timestep)?;
        self.current.prepare_timestep(timestep)
    }

    fn calc_e_phase(&mut self, axis: Axis, e: &mut [f32], h: &[f32]) {
        match axis {
            Axis::X => self.e_phase::<XTag>(e, h),
            Axis::Y => self.e_phase::<YTag>(e, h),
            Axis::Z => self.e_phase::<ZTag>(e, h),
        }
    }

    fn calc_h_phase(&mut self, axis: Axis, h: &mut [f32], e: &[f32]) {
        match axis {
            Axis::X => self.h_phase::<XTag>(h, e),
            Axis::Y => self.h_phase::<YTag>(h, e),
            Axis::Z => self.h_phase::<ZTag>(h, e),
        }
    }

    fn runline_count(&self) -> usize {
        self.runlines.iter().map(Vec::len).sum()
    }

    fn cell_count(&self) -> usize {
        self.setup.total_cells()
    }

    fn print_runlines(&self, out: &mut dyn Write, fields: &FieldStorage, registry: &BufferRegistry) -> Result<()> {
        writeln!(
            out,
            "{} ({}): {} runlines, {} cells",
            self.name,
            self.material.name(),
            self.runline_count(),
            self.cell_count()
        )?;
        for forcing in [self.pml.describe(), self.current.describe()].into_iter().flatten() {
            writeln!(out, "  + {}", forcing)?;
        }
        for dir in FieldDir::ALL {
            for rl in &self.runlines[dir.index()] {
                writeln!(out, "  {} {}", dir, rl.describe(fields, registry))?;
            }
        }
        Ok(())
    }
}
