// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use tracing::debug;

use super::{Discretization, MaterialModel, EPS0, MU0};
use crate::buffer::BufferRegistry;
use crate::error::{Result, YeeError};
use crate::grid::{Axis, AxisTag, FieldDir, FieldKind};
use crate::runline::{Runline, RunlineBuckets};

/// E-phase state: coefficients plus the polarization-current cursor.
#[derive(Debug, Clone, Copy)]
pub struct DrudeLocalE {
    axis: usize,
    cursor: usize,
    inv_dj: f32,
    inv_dk: f32,
}

/// H-phase state.
#[derive(Debug, Clone, Copy)]
pub struct DrudeLocalH {
    ch: f32,
    inv_dj: f32,
    inv_dk: f32,
}

/// Drude metal with one polarization current per E sample.
///
/// ```text
/// E' = E + ce*(curl - J_ext) - ce*J
/// J' = cj1*J + cj2*E'
/// ```
/// Magnetic response is that of vacuum.
#[derive(Debug, Clone)]
pub struct DrudeMetal {
    label: String,
    eps_inf: f64,
    ce: f32,
    cj1: f32,
    cj2: f32,
    ch: f32,
    disc: Discretization,
    current: [Vec<f32>; 3],
}

impl DrudeMetal {
    /// Metal with high-frequency permittivity `eps_inf`, plasma frequency
    /// `omega_p` (rad/s) and collision time `tau` (s).
    pub fn new(label: impl Into<String>, eps_inf: f64, omega_p: f64, tau: f64, disc: Discretization) -> Self {
        let dt = disc.dt;
        let half = dt / (2.0 * tau);
        DrudeMetal {
            label: label.into(),
            eps_inf,
            ce: (dt / (EPS0 * eps_inf)) as f32,
            cj1: ((1.0 - half) / (1.0 + half)) as f32,
            cj2: (EPS0 * omega_p * omega_p * dt / (1.0 + half)) as f32,
            ch: (dt / MU0) as f32,
            disc,
            current: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Polarization current along `axis`, indexed by aux index.
    pub fn polarization_current(&self, axis: Axis) -> &[f32] {
        &self.current[axis.index()]
    }

    /// `(ce, cj1, cj2)`.
    pub fn coefficients(&self) -> (f32, f32, f32) {
        (self.ce, self.cj1, self.cj2)
    }
}

impl MaterialModel for DrudeMetal {
    type LocalE = DrudeLocalE;
    type LocalH = DrudeLocalH;

    fn name(&self) -> &str {
        &self.label
    }

    fn relative_permittivity(&self) -> f64 {
        self.eps_inf
    }

    fn relative_permeability(&self) -> f64 {
        1.0
    }

    fn allocate_aux_buffers(&mut self, registry: &mut BufferRegistry, buckets: &RunlineBuckets) -> Result<()> {
        let mut ids = Vec::with_capacity(3);
        for axis in Axis::ALL {
            let dir = FieldDir::new(FieldKind::Electric, axis);
            let buffer_name = format!("Drude[{}] J{}", self.label, &dir.name()[1..]);
            let needed = buckets.aux_extent(dir);
            let slot = &mut self.current[axis.index()];
            if !slot.is_empty() && slot.len() != needed {
                return Err(YeeError::SizeMismatch {
                    what: buffer_name,
                    expected: needed,
                    got: slot.len(),
                });
            }
            slot.resize(needed, 0.0);
            if needed > 0 {
                ids.push(registry.register(buffer_name, needed, 1));
            }
        }
        registry.reserve(&ids)?;
        debug!(
            material = %self.label,
            jx = self.current[0].len(),
            jy = self.current[1].len(),
            jz = self.current[2].len(),
            "allocated Drude polarization currents"
        );
        Ok(())
    }

    fn init_local_e<D: AxisTag>(&self) -> DrudeLocalE {
        let (inv_dj, inv_dk) = self.disc.inv_transverse::<D>();
        DrudeLocalE {
            axis: D::INDEX,
            cursor: 0,
            inv_dj,
            inv_dk,
        }
    }

    fn on_start_runline_e(&self, local: &mut DrudeLocalE, runline: &Runline) {
        local.cursor = runline.aux_index;
    }

    #[inline(always)]
    fn update_e<D: AxisTag>(&mut self, l: &mut DrudeLocalE, e: f32, d_j: f32, d_k: f32, j: f32) -> f32 {
        let curl = d_k * l.inv_dj - d_j * l.inv_dk;
        let jd = &mut self.current[l.axis][l.cursor];
        let next = e + self.ce * (curl - j) - self.ce * *jd;
        *jd = self.cj1 * *jd + self.cj2 * next;
        next
    }

    fn after_update_e(&self, local: &mut DrudeLocalE) {
        local.cursor += 1;
    }

    fn init_local_h<D: AxisTag>(&self) -> DrudeLocalH {
        let (inv_dj, inv_dk) = self.disc.inv_transverse::<D>();
        DrudeLocalH {
            ch: self.ch,
            inv_dj,
            inv_dk,
        }
    }

    #[inline(always)]
    fn update_h<D: AxisTag>(&mut self, l: &mut DrudeLocalH, h: f32, d_j: f32, d_k: f32, k: f32) -> f32 {
        let curl = d_k * l.inv_dj - d_j * l.inv_dk;
        h - l.ch * (curl + k)
    }
}
