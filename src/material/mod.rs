// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Per-sample material update formulas.
//!
//! A material owns the final E and H formulas. PML and current contributors
//! only hand it an additive forcing term.

mod dielectric;
mod drude;
mod pec;

pub use dielectric::StaticDielectric;
pub use drude::DrudeMetal;
pub use pec::PerfectConductor;

use crate::buffer::BufferRegistry;
use crate::error::{Result, YeeError};
use crate::grid::AxisTag;
use crate::runline::{Runline, RunlineBuckets};

/// Vacuum permittivity in F/m.
pub const EPS0: f64 = 8.854_187_817e-12;
/// Vacuum permeability in H/m.
pub const MU0: f64 = 4.0e-7 * std::f64::consts::PI;
/// Speed of light in vacuum in m/s.
pub const C0: f64 = 299_792_458.0;
/// Impedance of free space in ohms.
pub const ETA0: f64 = 376.730_313_461_77;

/// Timestep and cell spacing shared by every model of a partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discretization {
    /// Timestep in seconds.
    pub dt: f64,
    /// Cell size per axis in meters.
    pub spacing: [f64; 3],
}

impl Discretization {
    /// Validate and build.
    ///
    /// # Errors
    /// Returns an error for non-positive or non-finite values.
    pub fn new(dt: f64, spacing: [f64; 3]) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(YeeError::InvalidTimestep(dt));
        }
        for &h in &spacing {
            if !h.is_finite() || h <= 0.0 {
                return Err(YeeError::InvalidGridSpacing(h));
            }
        }
        Ok(Discretization { dt, spacing })
    }

    /// Timestep at Courant number `courant` relative to the 3-D vacuum limit.
    ///
    /// # Errors
    /// Returns an error for non-positive spacing or courant.
    pub fn from_courant(courant: f64, spacing: [f64; 3]) -> Result<Self> {
        let inv: f64 = spacing.iter().map(|h| 1.0 / (h * h)).sum();
        let dt = courant / (C0 * inv.sqrt());
        Self::new(dt, spacing)
    }

    /// `(1/Δj, 1/Δk)` for the component along `D`.
    pub fn inv_transverse<D: AxisTag>(&self) -> (f32, f32) {
        (
            (1.0 / self.spacing[(D::INDEX + 1) % 3]) as f32,
            (1.0 / self.spacing[(D::INDEX + 2) % 3]) as f32,
        )
    }
}

/// Material update formula for one paint.
///
/// `D` selects the component axis at compile time. `d_j` and `d_k` are the
/// raw neighbor differences `F_j[+] - F_j[-]` and `F_k[+] - F_k[-]`; the
/// curl is `d_k/Δj - d_j/Δk`.
pub trait MaterialModel: Send {
    /// State carried through one E-phase call.
    type LocalE;
    /// State carried through one H-phase call.
    type LocalH;

    /// Short human-readable name.
    fn name(&self) -> &str;

    /// Relative permittivity seen by impedance-matched boundaries.
    fn relative_permittivity(&self) -> f64;

    /// Relative permeability seen by impedance-matched boundaries.
    fn relative_permeability(&self) -> f64;

    /// Size persistent per-cell state from the compiled runlines.
    ///
    /// # Errors
    /// Returns an error if existing state disagrees with the runlines.
    fn allocate_aux_buffers(
        &mut self,
        _registry: &mut BufferRegistry,
        _buckets: &RunlineBuckets,
    ) -> Result<()> {
        Ok(())
    }

    /// Fresh E-phase state for component `D`.
    fn init_local_e<D: AxisTag>(&self) -> Self::LocalE;
    /// Called before the first sample of each E runline.
    fn on_start_runline_e(&self, local: &mut Self::LocalE, runline: &Runline);
    /// New E sample.
    fn update_e<D: AxisTag>(&mut self, local: &mut Self::LocalE, e: f32, d_j: f32, d_k: f32, j: f32) -> f32;
    /// Called after every E sample.
    fn after_update_e(&self, _local: &mut Self::LocalE) {}

    /// Fresh H-phase state for component `D`.
    fn init_local_h<D: AxisTag>(&self) -> Self::LocalH;
    /// Called before the first sample of each H runline.
    fn on_start_runline_h(&self, _local: &mut Self::LocalH, _runline: &Runline) {}
    /// New H sample.
    fn update_h<D: AxisTag>(&mut self, local: &mut Self::LocalH, h: f32, d_j: f32, d_k: f32, k: f32) -> f32;
    /// Called after every H sample.
    fn after_update_h(&self, _local: &mut Self::LocalH) {}
}

/// Material assigned to a paint.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialSpec {
    /// Perfect electric conductor.
    Pec,
    /// Linear, possibly lossy, non-dispersive medium.
    Dielectric {
        /// Relative permittivity.
        eps_r: f64,
        /// Relative permeability.
        mu_r: f64,
        /// Electric conductivity in S/m.
        sigma: f64,
    },
    /// Drude metal.
    Drude {
        /// High-frequency relative permittivity.
        eps_inf: f64,
        /// Plasma frequency in rad/s.
        omega_p: f64,
        /// Collision time in seconds.
        tau: f64,
    },
}

impl MaterialSpec {
    /// Vacuum.
    pub fn vacuum() -> Self {
        MaterialSpec::Dielectric {
            eps_r: 1.0,
            mu_r: 1.0,
            sigma: 0.0,
        }
    }

    /// Lossless dielectric.
    pub fn dielectric(eps_r: f64) -> Self {
        MaterialSpec::Dielectric {
            eps_r,
            mu_r: 1.0,
            sigma: 0.0,
        }
    }

    /// Check physical parameters.
    ///
    /// # Errors
    /// Returns an error for non-positive permittivity, permeability or
    /// collision time, or negative conductivity.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(YeeError::InvalidConfig(msg));
        match *self {
            MaterialSpec::Pec => Ok(()),
            MaterialSpec::Dielectric { eps_r, mu_r, sigma } => {
                if !(eps_r > 0.0 && mu_r > 0.0) {
                    return bad(format!("eps_r {} and mu_r {} must be positive", eps_r, mu_r));
                }
                if !(sigma >= 0.0) {
                    return bad(format!("conductivity {} must be non-negative", sigma));
                }
                Ok(())
            }
            MaterialSpec::Drude {
                eps_inf,
                omega_p,
                tau,
            } => {
                if !(eps_inf > 0.0 && tau > 0.0) {
                    return bad(format!("eps_inf {} and tau {} must be positive", eps_inf, tau));
                }
                if !omega_p.is_finite() {
                    return bad(format!("plasma frequency {} must be finite", omega_p));
                }
                Ok(())
            }
        }
    }
}
