// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use super::{Discretization, MaterialModel, EPS0, MU0};
use crate::grid::AxisTag;
use crate::runline::Runline;

/// Coefficients of one E-phase call.
#[derive(Debug, Clone, Copy)]
pub struct DielectricLocalE {
    ce1: f32,
    ce2: f32,
    inv_dj: f32,
    inv_dk: f32,
}

/// Coefficients of one H-phase call.
#[derive(Debug, Clone, Copy)]
pub struct DielectricLocalH {
    ch: f32,
    inv_dj: f32,
    inv_dk: f32,
}

/// Linear isotropic medium with optional electric conductivity.
///
/// The conduction term is averaged between time levels, giving
/// `ce1 = (1 - σΔt/2ε)/(1 + σΔt/2ε)` and `ce2 = (Δt/ε)/(1 + σΔt/2ε)`.
#[derive(Debug, Clone)]
pub struct StaticDielectric {
    eps_r: f64,
    mu_r: f64,
    ce1: f32,
    ce2: f32,
    ch: f32,
    disc: Discretization,
}

impl StaticDielectric {
    /// Medium with the given relative constants and conductivity in S/m.
    pub fn new(eps_r: f64, mu_r: f64, sigma: f64, disc: Discretization) -> Self {
        let eps = EPS0 * eps_r;
        let loss = sigma * disc.dt / (2.0 * eps);
        StaticDielectric {
            eps_r,
            mu_r,
            ce1: ((1.0 - loss) / (1.0 + loss)) as f32,
            ce2: ((disc.dt / eps) / (1.0 + loss)) as f32,
            ch: (disc.dt / (MU0 * mu_r)) as f32,
            disc,
        }
    }

    /// Lossless vacuum.
    pub fn vacuum(disc: Discretization) -> Self {
        Self::new(1.0, 1.0, 0.0, disc)
    }

    /// `(ce1, ce2, ch)`.
    pub fn coefficients(&self) -> (f32, f32, f32) {
        (self.ce1, self.ce2, self.ch)
    }
}

impl MaterialModel for StaticDielectric {
    type LocalE = DielectricLocalE;
    type LocalH = DielectricLocalH;

    fn name(&self) -> &str {
        "dielectric"
    }

    fn relative_permittivity(&self) -> f64 {
        self.eps_r
    }

    fn relative_permeability(&self) -> f64 {
        self.mu_r
    }

    fn init_local_e<D: AxisTag>(&self) -> DielectricLocalE {
        let (inv_dj, inv_dk) = self.disc.inv_transverse::<D>();
        DielectricLocalE {
            ce1: self.ce1,
            ce2: self.ce2,
            inv_dj,
            inv_dk,
        }
    }

    fn on_start_runline_e(&self, _local: &mut DielectricLocalE, _runline: &Runline) {}

    #[inline(always)]
    fn update_e<D: AxisTag>(&mut self, l: &mut DielectricLocalE, e: f32, d_j: f32, d_k: f32, j: f32) -> f32 {
        let curl = d_k * l.inv_dj - d_j * l.inv_dk;
        l.ce1 * e + l.ce2 * (curl - j)
    }

    fn init_local_h<D: AxisTag>(&self) -> DielectricLocalH {
        let (inv_dj, inv_dk) = self.disc.inv_transverse::<D>();
        DielectricLocalH {
            ch: self.ch,
            inv_dj,
            inv_dk,
        }
    }

    #[inline(always)]
    fn update_h<D: AxisTag>(&mut self, l: &mut DielectricLocalH, h: f32, d_j: f32, d_k: f32, k: f32) -> f32 {
        let curl = d_k * l.inv_dj - d_j * l.inv_dk;
        h - l.ch * (curl + k)
    }
}
