//! Binary policy checkpoints.
//!
//! Layout, all little-endian:
//!
//! | field         | type                         |
//! |---------------|------------------------------|
//! | `size`        | `i32`                        |
//! | `hidden_size` | `i32`                        |
//! | `W0`          | `size² · hidden_size` × f32  |
//! | `W1`          | `size² · hidden_size` × f32  |
//! | `W2`          | `hidden_size · 3` × f32      |
//!
//! Matrices are stored row-major.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use super::brain::{AppleBias, Matrix, NUM_ACTIONS, Policy, Weights};
use super::params::MAX_HIDDEN_SIZE;

/// Largest board a checkpoint may describe; cells are stored as `u8` on the board.
const MAX_CELLS: usize = u8::MAX as usize;

/// Errors raised while reading or writing checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The file could not be opened, written, or ended early.
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The header holds dimensions no policy can have.
    #[error("invalid checkpoint header: size {size}, hidden size {hidden_size}")]
    InvalidHeader {
        /// Stored board size.
        size: i32,
        /// Stored hidden width.
        hidden_size: i32,
    },
    /// The stored shape differs from the one the caller expects.
    #[error(
        "checkpoint shape mismatch: expected ({expected_size}, {expected_hidden}), found ({size}, {hidden_size})"
    )]
    ShapeMismatch {
        /// Expected board size.
        expected_size: usize,
        /// Expected hidden width.
        expected_hidden: usize,
        /// Stored board size.
        size: usize,
        /// Stored hidden width.
        hidden_size: usize,
    },
    /// Bytes remain after `W2`.
    #[error("checkpoint has trailing bytes after the weights")]
    TrailingBytes,
}

/// Writes `policy` in checkpoint format.
pub fn write_policy<W: Write>(policy: &Policy, mut writer: W) -> Result<(), CheckpointError> {
    writer.write_all(&(policy.size() as i32).to_le_bytes())?;
    writer.write_all(&(policy.hidden_size() as i32).to_le_bytes())?;
    for value in policy.weights().iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a policy of whatever shape the header declares.
pub fn read_policy<R: Read>(reader: R, apple_bias: AppleBias) -> Result<Policy, CheckpointError> {
    read(reader, None, apple_bias)
}

/// Reads a policy, failing unless its shape is `(size, hidden_size)`.
pub fn read_policy_expecting<R: Read>(
    reader: R,
    size: usize,
    hidden_size: usize,
    apple_bias: AppleBias,
) -> Result<Policy, CheckpointError> {
    read(reader, Some((size, hidden_size)), apple_bias)
}

/// Saves `policy` to `path`.
///
/// The file is written next to its destination and renamed into place, so a crash
/// mid-write leaves the previous checkpoint intact.
pub fn save(policy: &Policy, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        write_policy(policy, &mut writer)?;
        writer.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a policy of any shape from `path`.
pub fn load(path: impl AsRef<Path>, apple_bias: AppleBias) -> Result<Policy, CheckpointError> {
    read_policy(BufReader::new(File::open(path)?), apple_bias)
}

/// Loads a policy from `path`, failing unless its shape is `(size, hidden_size)`.
pub fn load_expecting(
    path: impl AsRef<Path>,
    size: usize,
    hidden_size: usize,
    apple_bias: AppleBias,
) -> Result<Policy, CheckpointError> {
    read_policy_expecting(
        BufReader::new(File::open(path)?),
        size,
        hidden_size,
        apple_bias,
    )
}

fn read<R: Read>(
    mut reader: R,
    expected: Option<(usize, usize)>,
    apple_bias: AppleBias,
) -> Result<Policy, CheckpointError> {
    let raw_size = read_i32(&mut reader)?;
    let raw_hidden = read_i32(&mut reader)?;
    let invalid = || CheckpointError::InvalidHeader {
        size: raw_size,
        hidden_size: raw_hidden,
    };
    let size = usize::try_from(raw_size).map_err(|_| invalid())?;
    let hidden_size = usize::try_from(raw_hidden).map_err(|_| invalid())?;
    if !(2..=MAX_CELLS).contains(&size)
        || size * size > MAX_CELLS
        || !(1..=MAX_HIDDEN_SIZE).contains(&hidden_size)
    {
        return Err(invalid());
    }

    if let Some((expected_size, expected_hidden)) = expected {
        if (size, hidden_size) != (expected_size, expected_hidden) {
            return Err(CheckpointError::ShapeMismatch {
                expected_size,
                expected_hidden,
                size,
                hidden_size,
            });
        }
    }

    let cells = size * size;
    let weights = Weights {
        w0: read_matrix(&mut reader, cells, hidden_size)?,
        w1: read_matrix(&mut reader, cells, hidden_size)?,
        w2: read_matrix(&mut reader, hidden_size, NUM_ACTIONS)?,
    };

    let mut extra = [0_u8; 1];
    if reader.read(&mut extra)? != 0 {
        return Err(CheckpointError::TrailingBytes);
    }

    Ok(Policy::from_weights(size, hidden_size, apple_bias, weights))
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0_u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

/// Grows the buffer as values arrive, so a header promising more data than the
/// file holds fails at the first missing value instead of allocating up front.
fn read_matrix<R: Read>(reader: &mut R, rows: usize, cols: usize) -> io::Result<Matrix> {
    let mut values = Vec::new();
    let mut bytes = [0_u8; 4];
    for _ in 0..rows * cols {
        reader.read_exact(&mut bytes)?;
        values.push(f32::from_le_bytes(bytes));
    }
    Ok(Matrix::from_vec(rows, cols, values))
}
