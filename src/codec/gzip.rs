//! Gzip stream codec.
//!
//! Operates on exactly one source stream and one destination stream; gzip
//! has no container concept, so multi-source input never reaches this
//! module.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::OpError;

/// Compresses one stream, returning the number of uncompressed bytes read.
pub fn compress(src: &mut dyn Read, dest: &mut dyn Write) -> Result<u64, OpError> {
    let mut encoder = GzEncoder::new(dest, Compression::default());
    let copied = io::copy(src, &mut encoder)?;
    encoder.finish()?;
    Ok(copied)
}

/// Decompresses one stream, returning the number of bytes written.
pub fn decompress(src: &mut dyn Read, dest: &mut dyn Write) -> Result<u64, OpError> {
    let mut decoder = GzDecoder::new(src);
    let copied = io::copy(&mut decoder, dest)?;
    Ok(copied)
}
