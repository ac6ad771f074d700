// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors raised while compiling runlines, allocating storage, or stepping fields.
#[derive(Debug)]
pub enum YeeError {
    /// Partition shape is invalid (an axis has no cells).
    InvalidGridShape {
        /// The axis index.
        axis: usize,
        /// The number of cells provided.
        size: usize,
    },
    /// Cell spacing is not positive and finite.
    InvalidGridSpacing(f64),
    /// Timestep is not positive and finite.
    InvalidTimestep(f64),
    /// A half-cell has all-even or all-odd parity and carries no field component.
    InvalidParity {
        /// The offending half-cell coordinate.
        half_cell: [i64; 3],
    },
    /// PML direction does not attenuate any axis or has a component outside -1..=1.
    InvalidAttenuation {
        /// The requested boundary direction.
        direction: [i8; 3],
    },
    /// A half-cell inside the partition carries no paint.
    UnpaintedCell {
        /// The offending half-cell coordinate.
        half_cell: [i64; 3],
    },
    /// A paint id has no material bound to it.
    UnknownPaint(u32),
    /// A half-cell lies outside the partition or its ghost shell.
    OutsidePartition {
        /// The offending half-cell coordinate.
        half_cell: [i64; 3],
    },
    /// A buffer pointer offset is outside its buffer.
    BufferOutOfRange {
        /// Registry descriptor of the buffer.
        buffer: String,
        /// The offset requested.
        offset: usize,
        /// The buffer length.
        length: usize,
    },
    /// A buffer pointer offset is not a multiple of the buffer stride.
    MisalignedOffset {
        /// Registry descriptor of the buffer.
        buffer: String,
        /// The offset requested.
        offset: usize,
        /// The buffer stride.
        stride: usize,
    },
    /// A buffer was resolved before its head address was bound.
    UnboundBuffer(String),
    /// A buffer id is not (or no longer) registered.
    UnknownBuffer(usize),
    /// Two cooperating arrays disagree on their size.
    SizeMismatch {
        /// What was being sized.
        what: String,
        /// The size the runlines require.
        expected: usize,
        /// The size actually present.
        got: usize,
    },
    /// Array shape does not match expected shape.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// A sample stream ended inside its duration window.
    StreamExhausted {
        /// The timestep whose samples were being read.
        timestep: u64,
        /// Samples required for this timestep.
        needed: usize,
        /// Samples actually available.
        got: usize,
    },
    /// Source configuration is not supported.
    UnsupportedSource(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Inconsistent engine configuration.
    InvalidConfig(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for YeeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YeeError::InvalidGridShape { axis, size } => {
                write!(
                    f,
                    "invalid grid shape: axis {} has {} cells (must be >= 1)",
                    axis, size
                )
            }
            YeeError::InvalidGridSpacing(h) => {
                write!(
                    f,
                    "invalid grid spacing: {} (must be positive and finite)",
                    h
                )
            }
            YeeError::InvalidTimestep(dt) => {
                write!(f, "invalid timestep: {} (must be positive and finite)", dt)
            }
            YeeError::InvalidParity { half_cell } => {
                write!(
                    f,
                    "half-cell {:?} has no field component (all-even or all-odd parity)",
                    half_cell
                )
            }
            YeeError::InvalidAttenuation { direction } => {
                write!(
                    f,
                    "invalid PML direction {:?}: expected components in -1..=1 with at least one nonzero",
                    direction
                )
            }
            YeeError::UnpaintedCell { half_cell } => {
                write!(f, "half-cell {:?} carries no paint", half_cell)
            }
            YeeError::UnknownPaint(id) => write!(f, "paint {} has no material", id),
            YeeError::OutsidePartition { half_cell } => {
                write!(f, "half-cell {:?} lies outside the partition", half_cell)
            }
            YeeError::BufferOutOfRange {
                buffer,
                offset,
                length,
            } => {
                write!(
                    f,
                    "offset {} out of range for buffer {} (length {})",
                    offset, buffer, length
                )
            }
            YeeError::MisalignedOffset {
                buffer,
                offset,
                stride,
            } => {
                write!(
                    f,
                    "offset {} is not a multiple of stride {} in buffer {}",
                    offset, stride, buffer
                )
            }
            YeeError::UnboundBuffer(name) => {
                write!(f, "buffer {} has no head address yet", name)
            }
            YeeError::UnknownBuffer(id) => write!(f, "buffer id {} is not registered", id),
            YeeError::SizeMismatch {
                what,
                expected,
                got,
            } => {
                write!(
                    f,
                    "size mismatch for {}: expected {}, got {}",
                    what, expected, got
                )
            }
            YeeError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            YeeError::StreamExhausted {
                timestep,
                needed,
                got,
            } => {
                write!(
                    f,
                    "sample stream exhausted at timestep {}: needed {} samples, got {}",
                    timestep, needed, got
                )
            }
            YeeError::UnsupportedSource(msg) => write!(f, "unsupported source: {}", msg),
            YeeError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            YeeError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            YeeError::IoError(e) => write!(f, "I/O error: {}", e),
            YeeError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for YeeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            YeeError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for YeeError {
    fn from(e: std::io::Error) -> Self {
        YeeError::IoError(e)
    }
}

/// Convenience type alias for Results with YeeError.
pub type Result<T> = std::result::Result<T, YeeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_grid_shape() {
        let e = YeeError::InvalidGridShape { axis: 2, size: 0 };
        assert_eq!(
            e.to_string(),
            "invalid grid shape: axis 2 has 0 cells (must be >= 1)"
        );
    }

    #[test]
    fn display_invalid_parity() {
        let e = YeeError::InvalidParity {
            half_cell: [0, 2, 4],
        };
        assert_eq!(
            e.to_string(),
            "half-cell [0, 2, 4] has no field component (all-even or all-odd parity)"
        );
    }

    #[test]
    fn display_buffer_out_of_range() {
        let e = YeeError::BufferOutOfRange {
            buffer: "Ex".to_string(),
            offset: 12,
            length: 10,
        };
        assert_eq!(
            e.to_string(),
            "offset 12 out of range for buffer Ex (length 10)"
        );
    }

    #[test]
    fn display_stream_exhausted() {
        let e = YeeError::StreamExhausted {
            timestep: 7,
            needed: 3,
            got: 1,
        };
        assert_eq!(
            e.to_string(),
            "sample stream exhausted at timestep 7: needed 3 samples, got 1"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = YeeError::IoError(io_err);
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: YeeError = io_err.into();
        assert!(matches!(e, YeeError::IoError(_)));
    }

    #[test]
    fn display_size_mismatch() {
        let e = YeeError::SizeMismatch {
            what: "Drude[gold] Jx".to_string(),
            expected: 40,
            got: 32,
        };
        assert!(e.to_string().contains("Drude[gold] Jx"));
        assert!(e.to_string().contains("40"));
    }
}
