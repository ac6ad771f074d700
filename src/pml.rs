// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Complex-frequency-shifted convolutional PML.
//!
//! The stretched curl is written as the plain curl plus a per-axis correction
//! `J_a` carried by a single recursive accumulator `Phi_a`:
//!
//! ```text
//! J_a    = c_force * dF_a + Phi_a
//! Phi_a' = Phi_a + c_decay_h * dF_a - c_decay_j * J_a
//! ```
//!
//! which is the Roden-Gedney recursion `psi' = b*psi + c*dF/Δ` with
//! `Phi = b*psi`. The correction reaches the material formula as ordinary
//! forcing, so any material can sit inside a PML.

use std::marker::PhantomData;

use tracing::debug;

use crate::buffer::BufferRegistry;
use crate::error::{Result, YeeError};
use crate::grid::{Axis, AxisTag, FieldDir, HalfCellRect};
use crate::material::{Discretization, MaterialModel, EPS0, ETA0};
use crate::runline::{Runline, RunlineBuckets};
use crate::update::{FieldUpdater, ForcingModel, UpdateEquation};

/// Grading parameters of a PML region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmlParams {
    /// Polynomial order of the σ and κ grading.
    pub m: f64,
    /// κ at the outer edge.
    pub kappa_max: f64,
    /// Scale applied to the near-optimal σmax.
    pub sigma_coeff: f64,
    /// CFS shift α at the inner interface, in S/m.
    pub alpha_max: f64,
    /// Polynomial order of the α grading.
    pub m_alpha: f64,
}

impl Default for PmlParams {
    fn default() -> Self {
        PmlParams {
            m: 3.0,
            kappa_max: 1.0,
            sigma_coeff: 1.0,
            alpha_max: 0.0,
            m_alpha: 1.0,
        }
    }
}

impl PmlParams {
    /// Check that the grading stays finite and passive.
    ///
    /// # Errors
    /// Returns [`YeeError::InvalidConfig`] for non-finite values, `kappa_max < 1`
    /// or a negative order, scale or shift.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("m", self.m),
            ("kappa_max", self.kappa_max),
            ("sigma_coeff", self.sigma_coeff),
            ("alpha_max", self.alpha_max),
            ("m_alpha", self.m_alpha),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(YeeError::InvalidConfig(format!("PML {} must be finite, got {}", name, value)));
            }
            if value < 0.0 {
                return Err(YeeError::InvalidConfig(format!("PML {} must not be negative, got {}", name, value)));
            }
        }
        if self.kappa_max < 1.0 {
            return Err(YeeError::InvalidConfig(format!(
                "PML kappa_max must be at least 1, got {}",
                self.kappa_max
            )));
        }
        Ok(())
    }
}

/// Compile-time set of attenuated axes.
pub trait Attenuation: Send + Sync + 'static {
    /// Attenuated flag per axis.
    const AXES: [bool; 3];
    /// Short label for dumps.
    const NAME: &'static str;
}

macro_rules! attenuation {
    ($name:ident, $axes:expr, $label:literal) => {
        #[doc = concat!("Attenuation along ", $label, ".")]
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Attenuation for $name {
            const AXES: [bool; 3] = $axes;
            const NAME: &'static str = $label;
        }
    };
}

attenuation!(AttenX, [true, false, false], "x");
attenuation!(AttenY, [false, true, false], "y");
attenuation!(AttenZ, [false, false, true], "z");
attenuation!(AttenXY, [true, true, false], "xy");
attenuation!(AttenXZ, [true, false, true], "xz");
attenuation!(AttenYZ, [false, true, true], "yz");
attenuation!(AttenXYZ, [true, true, true], "xyz");

/// Attenuated axes of a boundary direction.
///
/// # Errors
/// Returns [`YeeError::InvalidAttenuation`] for `[0, 0, 0]` or components outside `-1..=1`.
pub fn attenuated_axes(direction: [i8; 3]) -> Result<[bool; 3]> {
    if direction.iter().any(|d| !(-1..=1).contains(d)) || direction == [0, 0, 0] {
        return Err(YeeError::InvalidAttenuation { direction });
    }
    Ok(direction.map(|d| d != 0))
}

/// Recursion coefficients at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PmlCoefficients {
    /// Weight of the neighbor difference in `J`.
    pub c_force: f32,
    /// Weight of the neighbor difference in the accumulator update.
    pub c_decay_h: f32,
    /// Weight of `J` removed from the accumulator.
    pub c_decay_j: f32,
}

impl PmlCoefficients {
    /// Coefficients for conductivity `sigma`, stretch `kappa` and shift
    /// `alpha` in a background of relative permittivity `eps_r`.
    pub fn derive(sigma: f64, kappa: f64, alpha: f64, eps_r: f64, dt: f64, delta: f64) -> Self {
        let s = sigma / (EPS0 * eps_r);
        let a = alpha / (EPS0 * eps_r);
        let b = (-(s / kappa + a) * dt).exp();
        let c = if s == 0.0 {
            0.0
        } else {
            s * (b - 1.0) / (s * kappa + kappa * kappa * a)
        };
        let stretch = 1.0 / kappa - 1.0;
        let c_force = (stretch + c) / delta;
        PmlCoefficients {
            c_force: c_force as f32,
            c_decay_h: (c_force - b * stretch / delta) as f32,
            c_decay_j: (1.0 - b) as f32,
        }
    }
}

/// Coefficient table for one attenuated axis, indexed by half-cell offset
/// from the region's low edge.
#[allow(clippy::too_many_arguments)]
pub fn axis_table(
    sign: i8,
    lo: i64,
    hi: i64,
    params: &PmlParams,
    eps_r: f64,
    mu_r: f64,
    dt: f64,
    delta: f64,
) -> Vec<PmlCoefficients> {
    let length = (hi + 1 - lo).max(0);
    let eta = ETA0 * (mu_r / eps_r).sqrt();
    let sigma_max = params.sigma_coeff * 0.8 * (params.m + 1.0) / (eta * delta);
    (0..length)
        .map(|offset| {
            let x = lo + offset;
            let depth = if sign > 0 {
                (x - lo) as f64 / length as f64
            } else {
                (hi + 1 - x) as f64 / length as f64
            };
            let grade = depth.powf(params.m);
            let sigma = sigma_max * grade;
            let kappa = 1.0 + (params.kappa_max - 1.0) * grade;
            let alpha = params.alpha_max * (1.0 - depth).powf(params.m_alpha);
            PmlCoefficients::derive(sigma, kappa, alpha, eps_r, dt, delta)
        })
        .collect()
}

/// Per-call PML cursor.
#[derive(Debug, Clone, Copy)]
pub struct PmlLocal {
    slot: usize,
    aux: usize,
    pos: [usize; 2],
    step: [usize; 2],
}

impl PmlLocal {
    fn new<D: AxisTag>(slot: usize) -> Self {
        let step_of = |axis: usize| if axis == 0 { 2 } else { 0 };
        PmlLocal {
            slot,
            aux: 0,
            pos: [0; 2],
            step: [step_of((D::INDEX + 1) % 3), step_of((D::INDEX + 2) % 3)],
        }
    }

    fn start<D: AxisTag>(&mut self, runline: &Runline) {
        self.aux = runline.aux_index;
        self.pos = [
            runline.pml_depth[(D::INDEX + 1) % 3],
            runline.pml_depth[(D::INDEX + 2) % 3],
        ];
    }

    fn advance(&mut self) {
        self.aux += 1;
        self.pos[0] += self.step[0];
        self.pos[1] += self.step[1];
    }
}

/// CFS-RIPML correction over one region, attenuating the axes of `A`.
///
/// Holds one coefficient table per attenuated axis and one accumulator array
/// per (component, attenuated transverse axis), indexed by the sample's rank
/// inside the region.
pub struct CfsRipml<A: Attenuation> {
    direction: [i8; 3],
    region: HalfCellRect,
    tables: [Vec<PmlCoefficients>; 3],
    phi: [[Vec<f32>; 2]; 6],
    _attenuation: PhantomData<A>,
}

impl<A: Attenuation> CfsRipml<A> {
    /// PML for `region`, graded outward along `direction` and impedance
    /// matched to a background of `eps_r`, `mu_r`.
    ///
    /// # Errors
    /// Returns [`YeeError::InvalidAttenuation`] if `direction` does not
    /// attenuate exactly the axes of `A`, or [`YeeError::InvalidConfig`] for
    /// invalid `params`.
    pub fn new(
        direction: [i8; 3],
        region: HalfCellRect,
        params: &PmlParams,
        eps_r: f64,
        mu_r: f64,
        disc: Discretization,
    ) -> Result<Self> {
        if attenuated_axes(direction)? != A::AXES {
            return Err(YeeError::InvalidAttenuation { direction });
        }
        params.validate()?;
        let tables = [0, 1, 2].map(|a| {
            if A::AXES[a] {
                axis_table(
                    direction[a],
                    region.lo[a],
                    region.hi[a],
                    params,
                    eps_r,
                    mu_r,
                    disc.dt,
                    disc.spacing[a],
                )
            } else {
                Vec::new()
            }
        });
        Ok(CfsRipml {
            direction,
            region,
            tables,
            phi: Default::default(),
            _attenuation: PhantomData,
        })
    }

    /// Coefficient table of an axis; empty if the axis is not attenuated.
    pub fn table(&self, axis: Axis) -> &[PmlCoefficients] {
        &self.tables[axis.index()]
    }

    /// Accumulator for component `dir` along its `j` (slot 0) or `k` (slot 1) axis.
    pub fn accumulator(&self, dir: FieldDir, slot: usize) -> &[f32] {
        &self.phi[dir.index()][slot]
    }

    /// Returns `(J_j, J_k)`; `J_j` acts on `d_k`, `J_k` on `d_j`.
    #[inline(always)]
    fn corrections<D: AxisTag>(&mut self, l: &PmlLocal, d_j: f32, d_k: f32) -> (f32, f32) {
        let mut jj = 0.0;
        let mut jk = 0.0;
        if A::AXES[(D::INDEX + 1) % 3] {
            let c = self.tables[(D::INDEX + 1) % 3][l.pos[0]];
            let phi = &mut self.phi[l.slot][0][l.aux];
            jj = c.c_force * d_k + *phi;
            *phi += c.c_decay_h * d_k - c.c_decay_j * jj;
        }
        if A::AXES[(D::INDEX + 2) % 3] {
            let c = self.tables[(D::INDEX + 2) % 3][l.pos[1]];
            let phi = &mut self.phi[l.slot][1][l.aux];
            jk = c.c_force * d_j + *phi;
            *phi += c.c_decay_h * d_j - c.c_decay_j * jk;
        }
        (jj, jk)
    }
}

impl<A: Attenuation> ForcingModel for CfsRipml<A> {
    type LocalE = PmlLocal;
    type LocalH = PmlLocal;

    fn init_local_e<D: AxisTag>(&self) -> PmlLocal {
        PmlLocal::new::<D>(D::INDEX)
    }

    fn on_start_runline_e<D: AxisTag>(&self, local: &mut PmlLocal, runline: &Runline) {
        local.start::<D>(runline);
    }

    #[inline(always)]
    fn update_j<D: AxisTag>(&mut self, local: &mut PmlLocal, d_j: f32, d_k: f32) -> f32 {
        let (jj, jk) = self.corrections::<D>(local, d_j, d_k);
        jk - jj
    }

    #[inline(always)]
    fn after_update_e<D: AxisTag>(&self, local: &mut PmlLocal) {
        local.advance();
    }

    fn init_local_h<D: AxisTag>(&self) -> PmlLocal {
        PmlLocal::new::<D>(3 + D::INDEX)
    }

    fn on_start_runline_h<D: AxisTag>(&self, local: &mut PmlLocal, runline: &Runline) {
        local.start::<D>(runline);
    }

    #[inline(always)]
    fn update_k<D: AxisTag>(&mut self, local: &mut PmlLocal, d_j: f32, d_k: f32) -> f32 {
        let (jj, jk) = self.corrections::<D>(local, d_j, d_k);
        jj - jk
    }

    #[inline(always)]
    fn after_update_h<D: AxisTag>(&self, local: &mut PmlLocal) {
        local.advance();
    }

    fn allocate_aux_buffers(&mut self, registry: &mut BufferRegistry, buckets: &RunlineBuckets) -> Result<()> {
        let mut ids = Vec::new();
        for dir in FieldDir::ALL {
            let capacity = self.region.count_with_parity(dir.parity());
            let used = buckets.aux_extent(dir);
            if used > capacity {
                return Err(YeeError::SizeMismatch {
                    what: format!("PML{:?} {} accumulator", self.direction, dir),
                    expected: used,
                    got: capacity,
                });
            }
            let transverse = [dir.axis().j(), dir.axis().k()];
            for (slot, axis) in transverse.into_iter().enumerate() {
                if !A::AXES[axis.index()] {
                    continue;
                }
                let phi = &mut self.phi[dir.index()][slot];
                phi.clear();
                phi.resize(capacity, 0.0);
                let name = format!(
                    "PML{:?} Phi{}{}",
                    self.direction,
                    dir,
                    ["x", "y", "z"][axis.index()]
                );
                ids.push(registry.register(name, capacity, 1));
            }
        }
        registry.reserve(&ids)?;
        debug!(
            direction = ?self.direction,
            attenuation = A::NAME,
            accumulators = ids.len(),
            "allocated PML accumulators"
        );
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(format!(
            "CFS-RIPML {:?} attenuating {} over {:?}..={:?}",
            self.direction,
            A::NAME,
            self.region.lo,
            self.region.hi
        ))
    }
}

fn compose<M, A, C>(
    name: &str,
    material: M,
    current: C,
    direction: [i8; 3],
    region: HalfCellRect,
    params: &PmlParams,
    disc: Discretization,
) -> Result<Box<dyn FieldUpdater>>
where
    M: MaterialModel + 'static,
    A: Attenuation,
    C: ForcingModel + 'static,
{
    let pml = CfsRipml::<A>::new(
        direction,
        region,
        params,
        material.relative_permittivity(),
        material.relative_permeability(),
        disc,
    )?;
    Ok(Box::new(UpdateEquation::new(name, material, pml, current)))
}

/// Wrap `material` in an impedance-matched PML covering `region`.
///
/// `direction` is the outward normal of the boundary piece (one of the 26
/// slab, edge and corner directions) and picks the attenuation marker.
///
/// # Errors
/// Returns [`YeeError::InvalidAttenuation`] for `[0, 0, 0]` or components outside `-1..=1`.
pub fn create_pml<M, C>(
    name: &str,
    material: M,
    current: C,
    direction: [i8; 3],
    region: HalfCellRect,
    params: &PmlParams,
    disc: Discretization,
) -> Result<Box<dyn FieldUpdater>>
where
    M: MaterialModel + 'static,
    C: ForcingModel + 'static,
{
    match attenuated_axes(direction)? {
        [true, false, false] => compose::<M, AttenX, C>(name, material, current, direction, region, params, disc),
        [false, true, false] => compose::<M, AttenY, C>(name, material, current, direction, region, params, disc),
        [false, false, true] => compose::<M, AttenZ, C>(name, material, current, direction, region, params, disc),
        [true, true, false] => compose::<M, AttenXY, C>(name, material, current, direction, region, params, disc),
        [true, false, true] => compose::<M, AttenXZ, C>(name, material, current, direction, region, params, disc),
        [false, true, true] => compose::<M, AttenYZ, C>(name, material, current, direction, region, params, disc),
        [true, true, true] => compose::<M, AttenXYZ, C>(name, material, current, direction, region, params, disc),
        [false, false, false] => Err(YeeError::InvalidAttenuation { direction }),
    }
}
