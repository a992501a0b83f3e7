//! Gzip-compressed archives of the whole dataset collection.
//!
//! The archive holds the same JSON array the store persists, so an archive
//! can be inspected with `zcat` and restored into any store.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, SheetError};
use crate::record::Dataset;

pub fn encode_archive(datasets: &[Dataset], out: impl Write) -> Result<()> {
    let mut encoder = GzEncoder::new(out, Compression::default());
    serde_json::to_writer(&mut encoder, datasets)?;
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn decode_archive(input: impl Read) -> Result<Vec<Dataset>> {
    let decoder = GzDecoder::new(input);
    serde_json::from_reader(BufReader::new(decoder))
        .map_err(|e| SheetError::Parse(format!("invalid archive: {e}")))
}

pub fn save_archive(datasets: &[Dataset], path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    encode_archive(datasets, BufWriter::new(file))
}

pub fn load_archive(path: impl AsRef<Path>) -> Result<Vec<Dataset>> {
    let file = File::open(path)?;
    decode_archive(file)
}
