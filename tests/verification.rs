// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashSet;

use approx::assert_relative_eq;

use yee_runline::buffer::BufferRegistry;
use yee_runline::current::StreamedCurrent;
use yee_runline::fields::FieldLayout;
use yee_runline::grid::{FieldDir, FieldKind, HalfCell, HalfCellRect, PaintId, PaintLookup, VoxelGrid};
use yee_runline::material::{DrudeMetal, MaterialSpec, EPS0, MU0};
use yee_runline::pml::PmlParams;
use yee_runline::runline::{AuxRegions, ContinuityConfig, RunlineCompiler};
use yee_runline::simulation::{Simulation, SimulationBuilder};
use yee_runline::source::{BufferedSamples, FieldSource, FormulaSamples, SampleWindow, SourceMode};

const SPACING: f64 = 1e-3;
const VACUUM: PaintId = PaintId(0);

fn vacuum_grid(cells: [usize; 3]) -> VoxelGrid {
    VoxelGrid::uniform(cells, [SPACING; 3], VACUUM).unwrap()
}

fn cell_rect(cell: [usize; 3]) -> HalfCellRect {
    HalfCellRect::from_cells(cell, cell.map(|c| c + 1))
}

/// Zero-mean Gaussian derivative centered in its window, so no charge is left behind.
fn dgauss_source(cell: [usize; 3], dt: f64, width_steps: f64) -> FieldSource {
    let tau = width_steps * dt;
    let t0 = 4.0 * tau;
    let pulse = FormulaSamples::new(
        move |t| {
            let u = (t - t0) / tau;
            (-u * (-u * u).exp()) as f32
        },
        dt,
    );
    FieldSource::new("pulse", FieldKind::Electric, [0.0, 0.0, 1.0], cell_rect(cell), Box::new(pulse))
        .with_mode(SourceMode::Soft)
        .with_window(SampleWindow::new(0, (8.0 * width_steps) as u64))
}

fn l1(a: HalfCell, b: HalfCell) -> i64 {
    (0..3).map(|i| (a[i] - b[i]).abs()).sum()
}

/// Every in-partition E sample farther than `radius` half-cells from `center` is zero.
fn e_outside_is_zero(sim: &Simulation, center: HalfCell, radius: i64) -> bool {
    let layout = sim.layout();
    let cells = layout.cells();
    for dir in [FieldDir::Ex, FieldDir::Ey, FieldDir::Ez] {
        let samples = sim.fields().component(dir);
        for (offset, &v) in samples.iter().enumerate() {
            let hc = layout.half_cell_of(dir, offset);
            let inside = (0..3).all(|a| hc[a] >= 0 && hc[a] < 2 * cells[a] as i64);
            if inside && l1(hc, center) > radius && v != 0.0 {
                return false;
            }
        }
    }
    true
}

/// A single hard impulse spreads by at most two half-cells per timestep.
#[test]
fn impulse_respects_light_cone() {
    let source_hc: HalfCell = [10, 10, 11];
    let source = FieldSource::new(
        "impulse",
        FieldKind::Electric,
        [0.0, 0.0, 1.0],
        cell_rect([5, 5, 5]),
        Box::new(BufferedSamples::new(vec![1.0])),
    )
    .with_window(SampleWindow::new(0, 0));
    let mut grid = vacuum_grid([10; 3]);
    for a in 0..3 {
        let mut hi = [10; 3];
        hi[a] = 1;
        grid.fill_cells([0; 3], hi, PaintId(1));
        let mut lo = [0; 3];
        lo[a] = 9;
        grid.fill_cells(lo, [10; 3], PaintId(1));
    }
    let mut sim = SimulationBuilder::from_courant(grid, 0.9)
        .unwrap()
        .with_material(VACUUM, "vacuum", MaterialSpec::vacuum())
        .with_material(PaintId(1), "shell", MaterialSpec::Pec)
        .with_source(source)
        .build()
        .unwrap();

    let far: HalfCell = [16, 10, 11];
    for t in 0..3u64 {
        sim.step().unwrap();
        assert_eq!(sim.value(far).unwrap(), 0.0, "far cell lit early after step {}", t);
        assert!(e_outside_is_zero(&sim, source_hc, 2 * t as i64));
    }
    sim.step().unwrap();
    assert!(sim.value(far).unwrap() != 0.0, "far cell dark after step 3");
    assert!(e_outside_is_zero(&sim, source_hc, 6));
}

/// Runlines of every paint together cover each component exactly once.
#[test]
fn runlines_cover_every_sample_once() {
    let mut grid = vacuum_grid([9, 7, 6]);
    grid.fill_cells([3, 2, 1], [6, 5, 4], PaintId(1));
    grid.fill(HalfCellRect::new([4, 3, 3], [9, 8, 6]), PaintId(2));
    let border = grid.paint_pml_border(2, 10);

    let mut registry = BufferRegistry::new();
    let layout = FieldLayout::new(grid.num_yee_cells(), &mut registry);
    let mut aux = AuxRegions::new();
    for region in &border {
        aux.insert(region.paint, region.rect);
    }
    let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
    let buckets = RunlineCompiler::new(&grid, &layout, &registry, &aux, ContinuityConfig::default())
        .compile(Some(&pool))
        .unwrap();

    let extent = grid.half_cell_extent();
    for dir in FieldDir::ALL {
        let total: usize = buckets.values().map(|b| b.cell_count(dir)).sum();
        assert_eq!(total, extent.count_with_parity(dir.parity()), "{}", dir);

        let mut seen = HashSet::new();
        for (paint, bucket) in &buckets {
            for rl in bucket.runlines(dir) {
                assert_eq!(rl.paint, *paint);
                for i in 0..rl.length {
                    let hc = [rl.start[0] + 2 * i as i64, rl.start[1], rl.start[2]];
                    assert_eq!(FieldDir::from_half_cell(hc).unwrap(), dir);
                    assert_eq!(grid.paint_at(hc), Some(*paint));
                    assert_eq!(layout.offset(hc), Some(rl.field.offset() + i));
                    assert!(seen.insert(hc), "{:?} covered twice", hc);
                }
            }
        }
        assert_eq!(seen.len(), total);
    }
}

/// Setup parallelism does not change the result.
#[test]
fn thread_count_does_not_change_fields() {
    let run = |threads: usize| {
        let mut grid = vacuum_grid([12, 10, 10]);
        grid.fill_cells([7, 2, 2], [9, 8, 8], PaintId(1));
        let builder = SimulationBuilder::from_courant(grid, 0.9).unwrap();
        let dt = builder.discretization().dt;
        let mut sim = builder
            .with_material(VACUUM, "vacuum", MaterialSpec::vacuum())
            .with_material(PaintId(1), "glass", MaterialSpec::dielectric(4.0))
            .with_pml_border(2, MaterialSpec::vacuum(), PmlParams::default())
            .with_source(dgauss_source([4, 5, 5], dt, 3.0))
            .with_threads(threads)
            .build()
            .unwrap();
        sim.run(40).unwrap();
        (sim.fields().e().to_vec(), sim.fields().h().to_vec())
    };
    assert_eq!(run(1), run(4));
}

fn pulse_energy(pml: usize, steps: u64) -> (f64, f64) {
    let builder = SimulationBuilder::from_courant(vacuum_grid([24; 3]), 0.95).unwrap();
    let dt = builder.discretization().dt;
    let mut sim = builder
        .with_material(VACUUM, "vacuum", MaterialSpec::vacuum())
        .with_pml_border(pml, MaterialSpec::vacuum(), PmlParams::default())
        .with_source(dgauss_source([12, 12, 12], dt, 4.0))
        .build()
        .unwrap();
    let mut peak = 0.0f64;
    for _ in 0..steps {
        sim.step().unwrap();
        peak = peak.max(sim.field_energy());
    }
    (peak, sim.field_energy())
}

/// A graded border absorbs an outgoing pulse that a closed box keeps.
#[test]
fn pml_border_absorbs_outgoing_pulse() {
    let (peak, remaining) = pulse_energy(6, 250);
    let (closed_peak, closed_remaining) = pulse_energy(0, 250);

    assert!(peak > 0.0 && closed_peak > 0.0);
    assert!(remaining.is_finite());
    assert!(
        remaining < 0.05 * peak,
        "PML kept {:.3e} of peak {:.3e}",
        remaining,
        peak
    );
    assert!(
        remaining < 0.1 * closed_remaining,
        "PML {:.3e} vs closed box {:.3e}",
        remaining,
        closed_remaining
    );
}

/// A uniform field inside a Drude metal oscillates at the plasma frequency.
#[test]
fn drude_plasma_oscillation() {
    let grid = vacuum_grid([20; 3]);
    let builder = SimulationBuilder::from_courant(grid, 0.9).unwrap();
    let disc = builder.discretization();
    let omega_p = 0.5 / disc.dt;
    let tau = 1.0;
    let mut sim = builder
        .with_material(
            VACUUM,
            "plasma",
            MaterialSpec::Drude {
                eps_inf: 1.0,
                omega_p,
                tau,
            },
        )
        .build()
        .unwrap();

    let layout = sim.layout().clone();
    for z in 0..20i64 {
        for y in 0..20i64 {
            for x in 0..20i64 {
                sim.fields_mut().set_value(&layout, [2 * x + 1, 2 * y, 2 * z], 1.0).unwrap();
            }
        }
    }

    let (ce, cj1, cj2) = DrudeMetal::new("reference", 1.0, omega_p, tau, disc).coefficients();
    let (mut e, mut j) = (1.0f32, 0.0f32);
    let center: HalfCell = [21, 20, 20];
    let mut flipped = false;
    for t in 0..8 {
        sim.step().unwrap();
        e = e + 0.0 - ce * j;
        j = cj1 * j + cj2 * e;
        let got = sim.value(center).unwrap();
        assert_relative_eq!(got, e, epsilon = 1e-5, max_relative = 1e-4);
        assert_eq!(sim.value([21, 21, 20]).unwrap(), 0.0, "Hz appeared at step {}", t);
        flipped |= got < 0.0;
    }
    assert!(flipped, "field never reversed within a half plasma period");
}

/// Impressed electric and magnetic currents drive exactly their own samples.
#[test]
fn streamed_currents_drive_their_paint() {
    let mut grid = vacuum_grid([8; 3]);
    grid.fill_cells([4, 4, 4], [5, 5, 5], PaintId(1));
    grid.fill_cells([2, 2, 2], [3, 3, 3], PaintId(2));

    let electric = StreamedCurrent::new(
        "jz",
        FieldKind::Electric,
        [0.0, 0.0, 1.0],
        Box::new(BufferedSamples::new(vec![2.0, -1.0])),
    )
    .with_window(SampleWindow::new(0, 1));
    let magnetic = StreamedCurrent::new(
        "kx",
        FieldKind::Magnetic,
        [1.0, 0.0, 0.0],
        Box::new(BufferedSamples::new(vec![3.0])),
    )
    .with_window(SampleWindow::new(0, 0));

    let builder = SimulationBuilder::from_courant(grid, 0.9).unwrap();
    let dt = builder.discretization().dt;
    let mut sim = builder
        .with_material(VACUUM, "vacuum", MaterialSpec::vacuum())
        .with_material(PaintId(1), "antenna", MaterialSpec::vacuum())
        .with_material(PaintId(2), "loop", MaterialSpec::vacuum())
        .with_current(PaintId(1), electric)
        .with_current(PaintId(2), magnetic)
        .build()
        .unwrap();

    sim.step().unwrap();
    let ez = sim.value([8, 8, 9]).unwrap();
    assert_relative_eq!(ez, -2.0 * (dt / EPS0) as f32, max_relative = 1e-6);
    let hx = sim.value([4, 5, 5]).unwrap();
    assert_relative_eq!(hx, -3.0 * (dt / MU0) as f32, max_relative = 1e-6);
    // Polarization zero: the antenna's Ex is untouched in the E-phase.
    assert_eq!(sim.value([9, 8, 8]).unwrap(), 0.0);

    // Both streams are drained exactly at the end of their windows.
    sim.run(6).unwrap();
    assert_eq!(sim.timestep(), 7);
}

/// A PEC wall spanning the cross-section isolates the far side completely.
#[test]
fn pec_slab_blocks_all_fields() {
    let mut grid = vacuum_grid([30, 8, 8]);
    grid.fill_cells([14, 0, 0], [16, 8, 8], PaintId(1));
    let builder = SimulationBuilder::from_courant(grid, 0.9).unwrap();
    let dt = builder.discretization().dt;
    let mut sim = builder
        .with_material(VACUUM, "vacuum", MaterialSpec::vacuum())
        .with_material(PaintId(1), "wall", MaterialSpec::Pec)
        .with_source(dgauss_source([6, 4, 4], dt, 3.0))
        .build()
        .unwrap();
    sim.run(80).unwrap();

    let layout = sim.layout();
    let mut lit = false;
    for dir in FieldDir::ALL {
        for (offset, &v) in sim.fields().component(dir).iter().enumerate() {
            let hc = layout.half_cell_of(dir, offset);
            if hc[0] >= 32 {
                assert_eq!(v, 0.0, "{} leaked to {:?}", dir, hc);
            }
            if sim.grid().paint_at(hc) == Some(PaintId(1)) {
                assert_eq!(v, 0.0, "{} inside the wall at {:?}", dir, hc);
            }
            lit |= hc[0] < 28 && v != 0.0;
        }
    }
    assert!(lit, "source side never lit");
}

/// A dispersive background inside the border, driven by a current on one of
/// its slabs, stays finite and loses its energy.
#[test]
fn drude_border_with_current_decays() {
    let builder = SimulationBuilder::from_courant(vacuum_grid([12; 3]), 0.9)
        .unwrap()
        .with_material(VACUUM, "vacuum", MaterialSpec::vacuum());
    let dt = builder.discretization().dt;
    let drude = MaterialSpec::Drude {
        eps_inf: 1.0,
        omega_p: 0.3 / dt,
        tau: 20.0 * dt,
    };
    let builder = builder.with_pml_border(3, drude, PmlParams::default());
    let slab = builder.grid().paint_at([3, 13, 13]).unwrap();
    assert_ne!(slab, VACUUM);

    // One full sine period, so the drive leaves no net charge.
    let period = 10;
    let samples: Vec<f32> = (0..=period)
        .map(|n| (2.0 * std::f64::consts::PI * n as f64 / period as f64).sin() as f32)
        .collect();
    let current = StreamedCurrent::new(
        "drive",
        FieldKind::Electric,
        [0.0, 0.0, 1.0],
        Box::new(BufferedSamples::new(samples)),
    )
    .with_window(SampleWindow::new(0, period));
    let mut sim = builder.with_current(slab, current).build().unwrap();
    assert_eq!(sim.updater_names().len(), 27);

    let mut peak = 0.0f64;
    for t in 0..400 {
        sim.step().unwrap();
        let energy = sim.field_energy();
        assert!(energy.is_finite(), "energy diverged at step {}", t);
        peak = peak.max(energy);
    }
    let remaining = sim.field_energy();
    assert!(peak > 0.0, "current never drove the slab");
    assert!(
        remaining < 0.5 * peak,
        "border kept {:.3e} of peak {:.3e}",
        remaining,
        peak
    );
}
