// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! A Yee-grid FDTD update engine built on runlines.
//!
//! A painted voxel grid is compiled into runlines: maximal stretches of
//! same-component field samples that share a material and whose curl
//! neighbors sit at fixed strides. Each material's update equation is the
//! composition of a material model, an optional CFS-RIPML absorbing layer and
//! an optional impressed current, monomorphized per field direction. The
//! timestep loop then walks runlines with pointer-like cursors and no
//! per-cell dispatch.

#![warn(missing_docs)]

/// Named memory buffers and checked pointers into them.
pub mod buffer;
/// Impressed electric and magnetic currents streamed from sample suppliers.
pub mod current;
/// Error types for the library.
pub mod error;
/// Field sample layout and E/H storage arenas.
pub mod fields;
/// Half-cell geometry, field directions and painted voxel grids.
pub mod grid;
/// File I/O for sample streams, field snapshots and paint grids.
pub mod io;
/// Material update models: PEC, static dielectric and Drude metal.
pub mod material;
/// Convolutional PML (CFS-RIPML) forcing.
pub mod pml;
/// Runline compilation from painted grids.
pub mod runline;
/// Simulation builder and timestep driver.
pub mod simulation;
/// Hard and soft field sources and their sample suppliers.
pub mod source;
/// Update-equation composition core.
pub mod update;

pub use crate::error::{Result, YeeError};
pub use crate::grid::{FieldDir, HalfCell, HalfCellRect, PaintId, VoxelGrid};
pub use crate::material::{Discretization, MaterialSpec};
pub use crate::simulation::{ProgressInfo, Simulation, SimulationBuilder};
