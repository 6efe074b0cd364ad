//! JSON documents holding one transformation record.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use dirtk_core::{SpatialTransform, Transformation};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::record::TransformRecord;

/// Version of the document layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDocument {
    pub format: u32,
    pub transform: TransformRecord,
}

impl TransformDocument {
    pub fn new(transform: TransformRecord) -> Self {
        Self {
            format: FORMAT_VERSION,
            transform,
        }
    }
}

/// Write the parameters of `transform` as JSON.
pub fn write_json<W: Write>(transform: &Transformation, writer: W) -> Result<()> {
    let document = TransformDocument::new(TransformRecord::capture(transform)?);
    serde_json::to_writer_pretty(writer, &document).context("Failed to encode transformation parameters")?;
    Ok(())
}

/// Read a transformation from JSON written by [`write_json`].
pub fn read_json<R: Read>(reader: R) -> Result<Transformation> {
    let document: TransformDocument =
        serde_json::from_reader(reader).context("Failed to decode transformation parameters")?;
    if document.format != FORMAT_VERSION {
        bail!(
            "Unsupported transformation format {} (expected {})",
            document.format,
            FORMAT_VERSION
        );
    }
    document.transform.restore()
}

/// Save `transform` to a JSON file.
pub fn save_transform<P: AsRef<Path>>(transform: &Transformation, path: P) -> Result<()> {
    let file = File::create(path.as_ref()).context("Failed to create transformation file")?;
    let mut writer = BufWriter::new(file);
    write_json(transform, &mut writer)?;
    writer.flush().context("Failed to write transformation file")?;
    info!(kind = %transform.kind(), dofs = transform.num_dofs(), "saved transformation");
    Ok(())
}

/// Load a transformation saved by [`save_transform`].
pub fn load_transform<P: AsRef<Path>>(path: P) -> Result<Transformation> {
    let file = File::open(path.as_ref()).context("Failed to open transformation file")?;
    let transform = read_json(BufReader::new(file))?;
    info!(kind = %transform.kind(), dofs = transform.num_dofs(), "loaded transformation");
    Ok(transform)
}
