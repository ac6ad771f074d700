// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use yee_runline::grid::{FieldDir, HalfCellRect, PaintId, VoxelGrid};
use yee_runline::io;
use yee_runline::material::MaterialSpec;
use yee_runline::pml::PmlParams;
use yee_runline::simulation::{ProgressInfo, SimulationBuilder};
use yee_runline::source::{FieldSource, FormulaSamples, SampleWindow, SourceMode};

#[derive(Parser)]
#[command(name = "yee-runline", about = "Runline-compiled FDTD box with a Gaussian pulse")]
struct Cli {
    /// Grid size in Yee cells, comma-separated (e.g., 64,64,64)
    #[arg(short = 's', long)]
    size: String,

    /// Cell spacing in meters
    #[arg(long, default_value = "1e-3")]
    spacing: f64,

    /// Timestep as a fraction of the 3-D Courant limit
    #[arg(long, default_value = "0.95")]
    courant: f64,

    /// Number of timesteps
    #[arg(short = 'n', long, default_value = "200")]
    steps: u64,

    /// PML border thickness in cells (0 for a PEC shell)
    #[arg(long, default_value = "8")]
    pml: usize,

    /// Source cell, comma-separated (defaults to the grid center)
    #[arg(long)]
    source: Option<String>,

    /// Source component (ex, ey, ez, hx, hy, hz)
    #[arg(long, default_value = "ez")]
    component: String,

    /// Add the pulse to the field instead of overwriting it
    #[arg(long)]
    soft: bool,

    /// Pulse width in timesteps
    #[arg(long, default_value = "10.0")]
    pulse_width: f64,

    /// Output file path (.npy, .f32 or .bin), snapshot of the source component
    #[arg(short = 'o', long, default_value = "output.npy")]
    output: PathBuf,

    /// Number of Rayon worker threads used during setup
    #[arg(long)]
    threads: Option<usize>,

    /// Print every compiled runline to stdout before stepping
    #[arg(long)]
    dump_runlines: bool,

    /// Print step progress to stderr
    #[arg(long)]
    progress: bool,
}

fn parse_triple(s: &str, what: &str) -> Result<[usize; 3]> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected comma-separated integers", what))?;
    if parts.len() != 3 {
        bail!("--{} has {} components, expected 3", what, parts.len());
    }
    Ok([parts[0], parts[1], parts[2]])
}

fn parse_component(s: &str) -> Result<FieldDir> {
    match FieldDir::ALL
        .into_iter()
        .find(|d| d.name().eq_ignore_ascii_case(s))
    {
        Some(dir) => Ok(dir),
        None => bail!("unknown --component '{}': expected ex, ey, ez, hx, hy or hz", s),
    }
}

/// Paint the six outer faces with `paint`.
fn paint_shell(grid: &mut VoxelGrid, cells: [usize; 3], paint: PaintId) {
    for a in 0..3 {
        let mut lo = [0; 3];
        let mut hi = cells;
        hi[a] = 1;
        grid.fill_cells(lo, hi, paint);
        lo[a] = cells[a] - 1;
        hi[a] = cells[a];
        grid.fill_cells(lo, hi, paint);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("yee_runline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cells = parse_triple(&cli.size, "size")?;
    if cells.iter().any(|&n| n < 3) {
        bail!("--size must be at least 3 cells per axis, got {:?}", cells);
    }
    if cli.pml > 0 && cells.iter().any(|&n| n <= 2 * cli.pml) {
        bail!("--pml {} leaves no interior in a {:?} grid", cli.pml, cells);
    }
    let position = match &cli.source {
        Some(s) => parse_triple(s, "source")?,
        None => cells.map(|n| n / 2),
    };
    if (0..3).any(|a| position[a] >= cells[a]) {
        bail!("--source {:?} lies outside the {:?} grid", position, cells);
    }
    let component = parse_component(&cli.component)?;
    if !cli.pulse_width.is_finite() || cli.pulse_width <= 0.0 {
        bail!("--pulse-width must be positive, got {}", cli.pulse_width);
    }

    let vacuum = PaintId(0);
    let mut grid = VoxelGrid::uniform(cells, [cli.spacing; 3], vacuum).context("invalid grid")?;
    if cli.pml == 0 {
        paint_shell(&mut grid, cells, PaintId(1));
    }

    let mut builder = SimulationBuilder::from_courant(grid, cli.courant)
        .context("invalid timestep")?
        .with_material(vacuum, "vacuum", MaterialSpec::vacuum());
    if cli.pml == 0 {
        builder = builder.with_material(PaintId(1), "shell", MaterialSpec::Pec);
    } else {
        builder = builder.with_pml_border(cli.pml, MaterialSpec::vacuum(), PmlParams::default());
    }
    if let Some(threads) = cli.threads {
        builder = builder.with_threads(threads);
    }
    if cli.progress {
        builder = builder.with_progress(Box::new(|info: ProgressInfo| {
            eprintln!(
                "[{:.1}s] timestep {}/{}",
                info.elapsed.as_secs_f64(),
                info.timestep,
                info.target
            );
        }));
    }

    let dt = builder.discretization().dt;
    let tau = cli.pulse_width * dt;
    let t0 = 4.0 * tau;
    let pulse = FormulaSamples::new(move |t| (-((t - t0) / tau).powi(2)).exp() as f32, dt);
    let mut polarization = [0.0f32; 3];
    polarization[component.axis().index()] = 1.0;
    let mode = if cli.soft { SourceMode::Soft } else { SourceMode::Hard };
    let hi = position.map(|p| p + 1);
    let source = FieldSource::new(
        "pulse",
        component.kind(),
        polarization,
        HalfCellRect::from_cells(position, hi),
        Box::new(pulse),
    )
    .with_mode(mode)
    .with_window(SampleWindow::new(0, (8.0 * cli.pulse_width).ceil() as u64));
    builder = builder.with_source(source);

    let mut sim = builder.build().context("simulation setup failed")?;
    if cli.dump_runlines {
        let stdout = std::io::stdout();
        sim.print_runlines(&mut stdout.lock()).context("runline dump failed")?;
    }

    sim.run(cli.steps).context("stepping failed")?;
    info!(
        timestep = sim.timestep(),
        energy = sim.field_energy(),
        component = %component,
        "finished"
    );

    io::save_field(sim.fields(), sim.layout(), component, &cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    Ok(())
}
