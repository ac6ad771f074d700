// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::Array3;

use crate::error::{Result, YeeError};
use crate::fields::{FieldLayout, FieldStorage};
use crate::grid::{FieldDir, PaintLookup, VoxelGrid};
use crate::source::BinarySamples;

/// Supported file formats for field export and sample streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// Headerless little-endian f32 (`.f32` or `.bin`).
    RawF32,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("f32") | Some("bin") => Ok(FileFormat::RawF32),
        Some(ext) => Err(YeeError::UnsupportedFileFormat(ext.to_string())),
        None => Err(YeeError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Open a little-endian f32 sample stream for a source or current.
pub fn open_f32_stream(path: &Path) -> Result<BinarySamples<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(BinarySamples::new(BufReader::new(file)))
}

/// Read a whole little-endian f32 sample file.
///
/// # Errors
/// Returns an error if the file cannot be read or its length is not a
/// multiple of four bytes.
pub fn read_f32_samples(path: &Path) -> Result<Vec<f32>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(YeeError::SizeMismatch {
            what: format!("f32 samples in {}", path.display()),
            expected: bytes.len() / 4 * 4 + 4,
            got: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Write samples as little-endian f32.
pub fn write_f32_samples(path: &Path, samples: &[f32]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for &s in samples {
        w.write_all(&s.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Interior samples of one component, shaped `[nz, ny, nx]` (x fastest).
pub fn component_array(fields: &FieldStorage, layout: &FieldLayout, dir: FieldDir) -> Result<Array3<f32>> {
    let [nx, ny, nz] = layout.cells();
    let parity = dir.parity();
    let samples = fields.component(dir);
    let mut data = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz as i64 {
        for y in 0..ny as i64 {
            for x in 0..nx as i64 {
                let hc = [2 * x + parity[0], 2 * y + parity[1], 2 * z + parity[2]];
                let offset = layout
                    .offset(hc)
                    .ok_or(YeeError::OutsidePartition { half_cell: hc })?;
                data.push(samples[offset]);
            }
        }
    }
    Array3::from_shape_vec((nz, ny, nx), data).map_err(|e| YeeError::Other(format!("shape error: {}", e)))
}

/// Save one field component to a .npy file, ghost shell stripped.
pub fn save_field_npy(fields: &FieldStorage, layout: &FieldLayout, dir: FieldDir, path: &Path) -> Result<()> {
    let arr = component_array(fields, layout, dir)?;
    ndarray_npy::write_npy(path, &arr).map_err(|e| YeeError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Save one field component, inferring format from extension.
pub fn save_field(fields: &FieldStorage, layout: &FieldLayout, dir: FieldDir, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => save_field_npy(fields, layout, dir, path),
        FileFormat::RawF32 => {
            let arr = component_array(fields, layout, dir)?;
            write_f32_samples(path, &arr.iter().copied().collect::<Vec<_>>())
        }
    }
}

/// Load a paint grid stored as a `u32` array at half-cell resolution,
/// shaped `[2 nz, 2 ny, 2 nx]`. `u32::MAX` marks unpainted half-cells.
pub fn load_paint_npy(path: &Path, spacing: [f64; 3]) -> Result<VoxelGrid> {
    let arr: Array3<u32> = ndarray_npy::read_npy(path)
        .map_err(|e| YeeError::Other(format!("npy read error: {}", e)))?;
    let shape = arr.shape().to_vec();
    if shape.iter().any(|&n| n == 0 || n % 2 != 0) {
        let even: Vec<usize> = shape.iter().map(|&n| (n.max(1) + 1) / 2 * 2).collect();
        return Err(YeeError::ShapeMismatch {
            expected: even,
            got: shape,
        });
    }
    let cells = [shape[2] / 2, shape[1] / 2, shape[0] / 2];
    // Logical iteration order is row-major whatever the file's memory order.
    let data: Vec<u32> = arr.iter().copied().collect();
    VoxelGrid::from_raw(cells, spacing, data)
}

/// Save a paint grid in the layout read by [`load_paint_npy`].
pub fn save_paint_npy(grid: &VoxelGrid, path: &Path) -> Result<()> {
    let [nx, ny, nz] = grid.num_yee_cells();
    let arr = Array3::from_shape_vec((2 * nz, 2 * ny, 2 * nx), grid.raw().to_vec())
        .map_err(|e| YeeError::Other(format!("shape error: {}", e)))?;
    ndarray_npy::write_npy(path, &arr).map_err(|e| YeeError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferRegistry;
    use crate::grid::PaintId;

    #[test]
    fn component_array_strips_ghosts() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([3, 2, 1], &mut reg);
        let mut fields = FieldStorage::allocate(&layout, &mut reg).unwrap();
        // Ez at cell (2, 1, 0).
        fields.set_value(&layout, [4, 2, 1], 7.0).unwrap();
        // Ez in the ghost shell.
        fields.set_value(&layout, [-2, 0, 1], 9.0).unwrap();

        let arr = component_array(&fields, &layout, FieldDir::Ez).unwrap();
        assert_eq!(arr.shape(), &[1, 2, 3]);
        assert_eq!(arr[[0, 1, 2]], 7.0);
        assert_eq!(arr.iter().sum::<f32>(), 7.0);
    }

    #[test]
    fn field_npy_roundtrip() {
        let mut reg = BufferRegistry::new();
        let layout = FieldLayout::new([4, 3, 2], &mut reg);
        let mut fields = FieldStorage::allocate(&layout, &mut reg).unwrap();
        fields.set_value(&layout, [1, 2, 2], 1.5).unwrap();

        let tmp = std::env::temp_dir().join("yee_runline_test_field.npy");
        save_field(&fields, &layout, FieldDir::Ex, &tmp).unwrap();
        let loaded: Array3<f32> = ndarray_npy::read_npy(&tmp).unwrap();
        assert_eq!(loaded.shape(), &[2, 3, 4]);
        assert_eq!(loaded[[1, 1, 0]], 1.5);
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn paint_npy_roundtrip() {
        let mut grid = VoxelGrid::uniform([3, 2, 2], [1.0; 3], PaintId(0)).unwrap();
        grid.fill_cells([1, 0, 0], [2, 1, 1], PaintId(4));
        let tmp = std::env::temp_dir().join("yee_runline_test_paint.npy");
        save_paint_npy(&grid, &tmp).unwrap();

        let loaded = load_paint_npy(&tmp, [1.0; 3]).unwrap();
        assert_eq!(loaded.num_yee_cells(), [3, 2, 2]);
        assert_eq!(loaded.raw(), grid.raw());
        assert_eq!(loaded.paint_at([3, 0, 1]), Some(PaintId(4)));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn odd_paint_shape_rejected() {
        let arr = Array3::<u32>::zeros((2, 3, 2));
        let tmp = std::env::temp_dir().join("yee_runline_test_odd_paint.npy");
        ndarray_npy::write_npy(&tmp, &arr).unwrap();
        let result = load_paint_npy(&tmp, [1.0; 3]);
        assert!(matches!(result, Err(YeeError::ShapeMismatch { .. })));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn f32_samples_roundtrip() {
        let tmp = std::env::temp_dir().join("yee_runline_test_samples.f32");
        write_f32_samples(&tmp, &[0.5, -1.0, 3.25]).unwrap();
        assert_eq!(read_f32_samples(&tmp).unwrap(), vec![0.5, -1.0, 3.25]);

        std::fs::write(&tmp, [0u8; 6]).unwrap();
        assert!(matches!(read_f32_samples(&tmp), Err(YeeError::SizeMismatch { got: 6, .. })));
        std::fs::remove_file(&tmp).ok();
    }

    #[test]
    fn unsupported_format() {
        assert_eq!(infer_format(Path::new("ez.npy")).unwrap(), FileFormat::Npy);
        assert_eq!(infer_format(Path::new("pulse.bin")).unwrap(), FileFormat::RawF32);
        let result = infer_format(Path::new("test.xyz"));
        assert!(matches!(result, Err(YeeError::UnsupportedFileFormat(_))));
    }
}
