// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Time-series inputs and direct field excitation.

use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::error::{Result, YeeError};
use crate::fields::FieldLayout;
use crate::grid::{first_with_parity, Axis, FieldDir, FieldKind, HalfCellRect};

/// Producer of excitation samples, pulled once per timestep.
pub trait SampleSupplier: Send {
    /// Fill `out` with the samples of `timestep`.
    ///
    /// # Errors
    /// Returns [`YeeError::StreamExhausted`] if fewer than `out.len()` samples remain.
    fn next_samples(&mut self, timestep: u64, out: &mut [f32]) -> Result<()>;
}

/// Raw little-endian `f32` samples read in temporal order, no header.
pub struct BinarySamples<R> {
    reader: R,
    bytes: Vec<u8>,
}

impl<R: Read + Send> BinarySamples<R> {
    /// Stream samples from `reader`.
    pub fn new(reader: R) -> Self {
        BinarySamples {
            reader,
            bytes: Vec::new(),
        }
    }
}

impl<R: Read + Send> SampleSupplier for BinarySamples<R> {
    fn next_samples(&mut self, timestep: u64, out: &mut [f32]) -> Result<()> {
        self.bytes.resize(out.len() * 4, 0);
        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.reader.read(&mut self.bytes[filled..]) {
                Ok(0) => {
                    return Err(YeeError::StreamExhausted {
                        timestep,
                        needed: out.len(),
                        got: filled / 4,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        for (value, chunk) in out.iter_mut().zip(self.bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }
}

/// Samples computed from a closure of time, identical for every requested slot.
pub struct FormulaSamples<F> {
    formula: F,
    dt: f64,
    offset: f64,
}

impl<F: FnMut(f64) -> f32 + Send> FormulaSamples<F> {
    /// Evaluate `formula(t)` at `t = timestep * dt`.
    pub fn new(formula: F, dt: f64) -> Self {
        FormulaSamples {
            formula,
            dt,
            offset: 0.0,
        }
    }

    /// Shift evaluation times by `steps` timesteps, e.g. `0.5` for H-phase inputs.
    pub fn with_time_offset(mut self, steps: f64) -> Self {
        self.offset = steps;
        self
    }
}

impl<F: FnMut(f64) -> f32 + Send> SampleSupplier for FormulaSamples<F> {
    fn next_samples(&mut self, timestep: u64, out: &mut [f32]) -> Result<()> {
        let t = (timestep as f64 + self.offset) * self.dt;
        out.fill((self.formula)(t));
        Ok(())
    }
}

/// Samples served from memory in order.
#[derive(Debug, Clone, Default)]
pub struct BufferedSamples {
    data: Vec<f32>,
    cursor: usize,
}

impl BufferedSamples {
    /// Serve `data` front to back.
    pub fn new(data: Vec<f32>) -> Self {
        BufferedSamples { data, cursor: 0 }
    }

    /// Samples not yet served.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }
}

impl SampleSupplier for BufferedSamples {
    fn next_samples(&mut self, timestep: u64, out: &mut [f32]) -> Result<()> {
        if self.remaining() < out.len() {
            return Err(YeeError::StreamExhausted {
                timestep,
                needed: out.len(),
                got: self.remaining(),
            });
        }
        out.copy_from_slice(&self.data[self.cursor..self.cursor + out.len()]);
        self.cursor += out.len();
        Ok(())
    }
}

/// Inclusive range of timesteps during which a source is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    /// First active timestep.
    pub first: u64,
    /// Last active timestep.
    pub last: u64,
}

impl SampleWindow {
    /// Active on `first..=last`.
    pub fn new(first: u64, last: u64) -> Self {
        SampleWindow { first, last }
    }

    /// Active forever.
    pub fn always() -> Self {
        SampleWindow {
            first: 0,
            last: u64::MAX,
        }
    }

    /// True if `timestep` is inside the window.
    pub fn contains(&self, timestep: u64) -> bool {
        timestep >= self.first && timestep <= self.last
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::always()
    }
}

/// How a field source combines with the evolving field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Overwrite the sample.
    Hard,
    /// Add to the sample.
    Soft,
}

/// Direct excitation of E or H samples over a box, applied right after the
/// matching phase.
pub struct FieldSource {
    label: String,
    mode: SourceMode,
    kind: FieldKind,
    polarization: [f32; 3],
    region: HalfCellRect,
    window: SampleWindow,
    per_cell: bool,
    masks: [Option<Vec<f32>>; 3],
    supplier: Box<dyn SampleSupplier>,
    targets: [Vec<usize>; 3],
    samples: Vec<f32>,
}

impl FieldSource {
    /// Hard source of `kind` fields over `region`, always active, one sample
    /// per timestep shared by every target.
    pub fn new(
        label: impl Into<String>,
        kind: FieldKind,
        polarization: [f32; 3],
        region: HalfCellRect,
        supplier: Box<dyn SampleSupplier>,
    ) -> Self {
        FieldSource {
            label: label.into(),
            mode: SourceMode::Hard,
            kind,
            polarization,
            region,
            window: SampleWindow::always(),
            per_cell: false,
            masks: Default::default(),
            supplier,
            targets: Default::default(),
            samples: Vec::new(),
        }
    }

    /// Set hard or soft combination.
    pub fn with_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict activity to `window`.
    pub fn with_window(mut self, window: SampleWindow) -> Self {
        self.window = window;
        self
    }

    /// Pull one sample per target instead of one per timestep.
    pub fn with_per_cell_samples(mut self, per_cell: bool) -> Self {
        self.per_cell = per_cell;
        self
    }

    /// Per-target weights for the component along `axis`, in region rank order.
    pub fn with_mask(mut self, axis: Axis, mask: Vec<f32>) -> Self {
        self.masks[axis.index()] = Some(mask);
        self
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Field kind excited.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Resolve target samples to arena indices.
    ///
    /// # Errors
    /// Returns an error if a target lies outside the partition (ghost shell
    /// included) or a mask has the wrong length.
    pub fn bind(&mut self, layout: &FieldLayout) -> Result<()> {
        let len = layout.component_len();
        let partition = HalfCellRect::from_cells([0; 3], layout.cells());
        for axis in Axis::ALL {
            let a = axis.index();
            self.targets[a].clear();
            if self.polarization[a] == 0.0 {
                continue;
            }
            let dir = FieldDir::new(self.kind, axis);
            let parity = dir.parity();
            let start = [0, 1, 2].map(|i| first_with_parity(self.region.lo[i], parity[i]));
            for z in (start[2]..=self.region.hi[2]).step_by(2) {
                for y in (start[1]..=self.region.hi[1]).step_by(2) {
                    for x in (start[0]..=self.region.hi[0]).step_by(2) {
                        let hc = [x, y, z];
                        let offset = layout
                            .offset(hc)
                            .filter(|_| partition.contains(hc))
                            .ok_or(YeeError::OutsidePartition { half_cell: hc })?;
                        self.targets[a].push(a * len + offset);
                    }
                }
            }
            if let Some(mask) = &self.masks[a] {
                if mask.len() != self.targets[a].len() {
                    return Err(YeeError::SizeMismatch {
                        what: format!("source {} {} mask", self.label, dir),
                        expected: self.targets[a].len(),
                        got: mask.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of bound targets across components.
    pub fn target_count(&self) -> usize {
        self.targets.iter().map(Vec::len).sum()
    }

    /// Apply the samples of `timestep` to the arena of this source's kind.
    ///
    /// Nothing is read or written outside the window.
    ///
    /// # Errors
    /// Returns an error if the supplier fails.
    pub fn apply(&mut self, timestep: u64, arena: &mut [f32]) -> Result<()> {
        if !self.window.contains(timestep) {
            return Ok(());
        }
        let needed = if self.per_cell { self.target_count() } else { 1 };
        self.samples.resize(needed, 0.0);
        self.supplier.next_samples(timestep, &mut self.samples)?;

        let mut cursor = 0;
        for a in 0..3 {
            let pol = self.polarization[a];
            for (n, &index) in self.targets[a].iter().enumerate() {
                let sample = if self.per_cell {
                    self.samples[cursor + n]
                } else {
                    self.samples[0]
                };
                let weight = self.masks[a].as_ref().map_or(1.0, |m| m[n]);
                let value = pol * sample * weight;
                match self.mode {
                    SourceMode::Hard => arena[index] = value,
                    SourceMode::Soft => arena[index] += value,
                }
            }
            if self.per_cell {
                cursor += self.targets[a].len();
            }
        }
        trace!(source = %self.label, timestep, "applied field source");
        Ok(())
    }
}
