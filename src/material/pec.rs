// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use super::MaterialModel;
use crate::grid::AxisTag;
use crate::runline::Runline;

/// Perfect conductor. Every sample is forced to zero.
#[derive(Debug, Clone, Default)]
pub struct PerfectConductor;

impl MaterialModel for PerfectConductor {
    type LocalE = ();
    type LocalH = ();

    fn name(&self) -> &str {
        "PEC"
    }

    fn relative_permittivity(&self) -> f64 {
        1.0
    }

    fn relative_permeability(&self) -> f64 {
        1.0
    }

    fn init_local_e<D: AxisTag>(&self) {}

    fn on_start_runline_e(&self, _local: &mut (), _runline: &Runline) {}

    #[inline(always)]
    fn update_e<D: AxisTag>(&mut self, _local: &mut (), _e: f32, _d_j: f32, _d_k: f32, _j: f32) -> f32 {
        0.0
    }

    fn init_local_h<D: AxisTag>(&self) {}

    #[inline(always)]
    fn update_h<D: AxisTag>(&mut self, _local: &mut (), _h: f32, _d_j: f32, _d_k: f32, _k: f32) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{XTag, ZTag};

    #[test]
    fn always_zero() {
        let mut pec = PerfectConductor;
        for (e, dj, dk, j) in [(1.0, 0.0, 0.0, 0.0), (-3.5, 2.0, 1.0, 7.0), (f32::MAX, 1e30, -1e30, 1.0)] {
            assert_eq!(pec.update_e::<XTag>(&mut (), e, dj, dk, j), 0.0);
            assert_eq!(pec.update_h::<ZTag>(&mut (), e, dj, dk, j), 0.0);
        }
    }

    #[test]
    fn idempotent() {
        let mut pec = PerfectConductor;
        let once = pec.update_e::<XTag>(&mut (), 5.0, 1.0, 1.0, 0.0);
        let twice = pec.update_e::<XTag>(&mut (), once, 1.0, 1.0, 0.0);
        assert_eq!(once, twice);
    }
}
