// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use tracing::{debug, trace};

use crate::buffer::BufferRegistry;
use crate::error::{Result, YeeError};
use crate::grid::{Axis, AxisTag, FieldDir, FieldKind};
use crate::runline::{Runline, RunlineBuckets};
use crate::source::{SampleSupplier, SampleWindow};
use crate::update::ForcingModel;

/// Per-call cursor into the sample and mask arrays.
#[derive(Debug, Clone, Copy)]
pub struct CurrentLocal {
    active: bool,
    axis: usize,
    stride: usize,
    sample: usize,
    mask: usize,
}

/// Impressed current density streamed from a [`SampleSupplier`].
///
/// Electric currents feed the E-phase as `J`, magnetic currents the H-phase
/// as `K`. Samples are either uniform over the material (stride 0) or one per
/// sample of the material in aux-index order (stride 1).
pub struct StreamedCurrent {
    label: String,
    kind: FieldKind,
    polarization: [f32; 3],
    per_cell: bool,
    window: SampleWindow,
    supplier: Box<dyn SampleSupplier>,
    masks: [Option<Vec<f32>>; 3],
    samples: [Vec<f32>; 3],
    scratch: Vec<f32>,
    in_window: bool,
}

impl StreamedCurrent {
    /// Uniform current of `kind`, active forever.
    pub fn new(
        label: impl Into<String>,
        kind: FieldKind,
        polarization: [f32; 3],
        supplier: Box<dyn SampleSupplier>,
    ) -> Self {
        StreamedCurrent {
            label: label.into(),
            kind,
            polarization,
            per_cell: false,
            window: SampleWindow::always(),
            supplier,
            masks: Default::default(),
            samples: Default::default(),
            scratch: Vec::new(),
            in_window: false,
        }
    }

    /// Restrict activity to `window`.
    pub fn with_window(mut self, window: SampleWindow) -> Self {
        self.window = window;
        self
    }

    /// Pull one sample per material sample instead of one per timestep.
    pub fn with_per_cell_samples(mut self, per_cell: bool) -> Self {
        self.per_cell = per_cell;
        self
    }

    /// Per-sample weights for the component along `axis`, indexed by aux index.
    pub fn with_mask(mut self, axis: Axis, mask: Vec<f32>) -> Self {
        self.masks[axis.index()] = Some(mask);
        self
    }

    /// Samples held for the component along `axis` in the current timestep.
    pub fn samples(&self, axis: Axis) -> &[f32] {
        &self.samples[axis.index()]
    }

    fn local<D: AxisTag>(&self, phase: FieldKind) -> CurrentLocal {
        let a = D::INDEX;
        CurrentLocal {
            active: self.in_window
                && phase == self.kind
                && self.polarization[a] != 0.0
                && !self.samples[a].is_empty(),
            axis: a,
            stride: usize::from(self.per_cell),
            sample: 0,
            mask: 0,
        }
    }

    #[inline(always)]
    fn value(&self, l: &CurrentLocal) -> f32 {
        if !l.active {
            return 0.0;
        }
        let weight = self.masks[l.axis].as_ref().map_or(1.0, |m| m[l.mask]);
        self.polarization[l.axis] * self.samples[l.axis][l.sample] * weight
    }
}

fn start(local: &mut CurrentLocal, runline: &Runline) {
    local.sample = runline.aux_index * local.stride;
    local.mask = runline.aux_index;
}

fn advance(local: &mut CurrentLocal) {
    local.sample += local.stride;
    local.mask += 1;
}

impl ForcingModel for StreamedCurrent {
    type LocalE = CurrentLocal;
    type LocalH = CurrentLocal;

    fn init_local_e<D: AxisTag>(&self) -> CurrentLocal {
        self.local::<D>(FieldKind::Electric)
    }

    fn on_start_runline_e<D: AxisTag>(&self, local: &mut CurrentLocal, runline: &Runline) {
        start(local, runline);
    }

    #[inline(always)]
    fn update_j<D: AxisTag>(&mut self, local: &mut CurrentLocal, _d_j: f32, _d_k: f32) -> f32 {
        self.value(local)
    }

    #[inline(always)]
    fn after_update_e<D: AxisTag>(&self, local: &mut CurrentLocal) {
        advance(local);
    }

    fn init_local_h<D: AxisTag>(&self) -> CurrentLocal {
        self.local::<D>(FieldKind::Magnetic)
    }

    fn on_start_runline_h<D: AxisTag>(&self, local: &mut CurrentLocal, runline: &Runline) {
        start(local, runline);
    }

    #[inline(always)]
    fn update_k<D: AxisTag>(&mut self, local: &mut CurrentLocal, _d_j: f32, _d_k: f32) -> f32 {
        self.value(local)
    }

    #[inline(always)]
    fn after_update_h<D: AxisTag>(&self, local: &mut CurrentLocal) {
        advance(local);
    }

    fn prepare_timestep(&mut self, timestep: u64) -> Result<()> {
        self.in_window = self.window.contains(timestep);
        if !self.in_window {
            return Ok(());
        }
        let active: Vec<usize> = (0..3)
            .filter(|&a| self.polarization[a] != 0.0 && !self.samples[a].is_empty())
            .collect();
        let needed: usize = active.iter().map(|&a| self.samples[a].len()).sum();
        self.scratch.resize(needed, 0.0);
        self.supplier.next_samples(timestep, &mut self.scratch)?;
        let mut cursor = 0;
        for a in active {
            let n = self.samples[a].len();
            self.samples[a].copy_from_slice(&self.scratch[cursor..cursor + n]);
            cursor += n;
        }
        trace!(current = %self.label, timestep, samples = needed, "pulled current samples");
        Ok(())
    }

    fn allocate_aux_buffers(&mut self, registry: &mut BufferRegistry, buckets: &RunlineBuckets) -> Result<()> {
        let mut ids = Vec::new();
        for axis in Axis::ALL {
            let a = axis.index();
            let dir = FieldDir::new(self.kind, axis);
            let extent = buckets.aux_extent(dir);
            if let Some(mask) = &self.masks[a] {
                if mask.len() != extent {
                    return Err(YeeError::SizeMismatch {
                        what: format!("current {} {} mask", self.label, dir),
                        expected: extent,
                        got: mask.len(),
                    });
                }
            }
            let len = match (extent, self.per_cell) {
                (0, _) => 0,
                (_, true) => extent,
                (_, false) => 1,
            };
            self.samples[a] = vec![0.0; len];
            if len > 0 {
                let stride = usize::from(self.per_cell);
                ids.push(registry.register(format!("Current[{}] {}", self.label, dir), len, stride));
            }
        }
        registry.reserve(&ids)?;
        debug!(
            current = %self.label,
            kind = ?self.kind,
            per_cell = self.per_cell,
            "allocated current samples"
        );
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(format!(
            "current {} ({:?}, pol {:?}, {})",
            self.label,
            self.kind,
            self.polarization,
            if self.per_cell { "per cell" } else { "uniform" }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{PaintId, XTag, YTag, ZTag};
    use crate::runline::{RunlineEncoder, SetupRunline};
    use crate::source::BufferedSamples;

    fn buckets(dirs: &[(FieldDir, usize)]) -> RunlineBuckets {
        let mut reg = BufferRegistry::new();
        let id = reg.register("dummy", 64, 1);
        let ptr = reg.pointer(id, 0).unwrap();
        let mut b = RunlineBuckets::default();
        for &(dir, length) in dirs {
            b.encode(SetupRunline {
                start: dir.parity(),
                length,
                paint: PaintId(0),
                field: ptr,
                nbr_j: [ptr; 2],
                nbr_k: [ptr; 2],
                aux_index: None,
                pml_depth: None,
            })
            .unwrap();
        }
        b
    }

    fn runline(aux_index: usize) -> Runline {
        Runline {
            start: [0, 0, 1],
            length: 3,
            field: 0,
            nbr_j: [0; 2],
            nbr_k: [0; 2],
            aux_index,
            pml_depth: [0; 3],
        }
    }

    #[test]
    fn uniform_electric_current() {
        let mut c = StreamedCurrent::new(
            "feed",
            FieldKind::Electric,
            [0.0, 0.0, 2.0],
            Box::new(BufferedSamples::new(vec![1.5, 3.0])),
        );
        let mut reg = BufferRegistry::new();
        c.allocate_aux_buffers(&mut reg, &buckets(&[(FieldDir::Ez, 4)])).unwrap();
        assert_eq!(c.samples(Axis::Z).len(), 1);

        c.prepare_timestep(0).unwrap();
        let mut l = c.init_local_e::<ZTag>();
        c.on_start_runline_e::<ZTag>(&mut l, &runline(1));
        for _ in 0..3 {
            assert_eq!(c.update_j::<ZTag>(&mut l, 0.0, 0.0), 3.0);
            c.after_update_e::<ZTag>(&mut l);
        }
        // Wrong phase and unpolarized axes contribute nothing.
        let mut h = c.init_local_h::<ZTag>();
        assert_eq!(c.update_k::<ZTag>(&mut h, 0.0, 0.0), 0.0);
        let mut lx = c.init_local_e::<XTag>();
        assert_eq!(c.update_j::<XTag>(&mut lx, 0.0, 0.0), 0.0);

        c.prepare_timestep(1).unwrap();
        let mut l = c.init_local_e::<ZTag>();
        assert_eq!(c.update_j::<ZTag>(&mut l, 0.0, 0.0), 6.0);
        assert!(matches!(
            c.prepare_timestep(2),
            Err(YeeError::StreamExhausted { timestep: 2, .. })
        ));
    }

    #[test]
    fn per_cell_masked_magnetic_current() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let mut c = StreamedCurrent::new("sheet", FieldKind::Magnetic, [0.0, 1.0, 0.0], Box::new(BufferedSamples::new(data)))
            .with_per_cell_samples(true)
            .with_mask(Axis::Y, vec![1.0, 0.0, 1.0, 0.5]);
        let mut reg = BufferRegistry::new();
        c.allocate_aux_buffers(&mut reg, &buckets(&[(FieldDir::Hy, 4)])).unwrap();
        c.prepare_timestep(0).unwrap();

        let mut l = c.init_local_h::<YTag>();
        c.on_start_runline_h::<YTag>(&mut l, &runline(1));
        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(c.update_k::<YTag>(&mut l, 0.0, 0.0));
            c.after_update_h::<YTag>(&mut l);
        }
        assert_eq!(got, vec![0.0, 3.0, 2.0]);
        assert!(reg.live_buffers().any(|(_, b)| b.name() == "Current[sheet] Hy"));
    }

    #[test]
    fn window_gates_reads() {
        let mut c = StreamedCurrent::new("late", FieldKind::Electric, [1.0, 0.0, 0.0], Box::new(BufferedSamples::new(vec![5.0])))
            .with_window(SampleWindow::new(3, 3));
        let mut reg = BufferRegistry::new();
        c.allocate_aux_buffers(&mut reg, &buckets(&[(FieldDir::Ex, 2)])).unwrap();
        for t in 0..3 {
            c.prepare_timestep(t).unwrap();
            let mut l = c.init_local_e::<XTag>();
            assert_eq!(c.update_j::<XTag>(&mut l, 0.0, 0.0), 0.0);
        }
        c.prepare_timestep(3).unwrap();
        let mut l = c.init_local_e::<XTag>();
        assert_eq!(c.update_j::<XTag>(&mut l, 0.0, 0.0), 5.0);
        c.prepare_timestep(4).unwrap();
        let mut l = c.init_local_e::<XTag>();
        assert_eq!(c.update_j::<XTag>(&mut l, 0.0, 0.0), 0.0);
    }

    #[test]
    fn mask_size_checked() {
        let mut c = StreamedCurrent::new("bad", FieldKind::Electric, [1.0, 0.0, 0.0], Box::new(BufferedSamples::default()))
            .with_mask(Axis::X, vec![1.0; 3]);
        let mut reg = BufferRegistry::new();
        assert!(matches!(
            c.allocate_aux_buffers(&mut reg, &buckets(&[(FieldDir::Ex, 5)])),
            Err(YeeError::SizeMismatch { expected: 5, got: 3, .. })
        ));
    }
}
