//! Payload compression applied when the compressed option bit is set.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{FrameError, Result};

/// Default deflate level used by [`DeflateFilter::default`] (best compression).
pub const DEFAULT_DEFLATE_LEVEL: u32 = 9;

/// Default zstd level used by [`ZstdFilter::default`].
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Default cap on decompressed output: 16 MiB.
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

const DECOMPRESS_CHUNK_SIZE: usize = 8 * 1024;

/// Reversible payload transform.
///
/// Empty input must map to empty output in both directions.
pub trait PayloadFilter: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// zlib-format deflate filter with a bounded decompression buffer.
///
/// This is the wire default. Compressed payloads are zlib streams, the
/// format `java.util.zip.Deflater` produces.
#[derive(Debug, Clone)]
pub struct DeflateFilter {
    level: u32,
    max_decompressed_size: usize,
}

impl Default for DeflateFilter {
    fn default() -> Self {
        Self {
            level: DEFAULT_DEFLATE_LEVEL,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

impl DeflateFilter {
    /// Levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
            ..Self::default()
        }
    }

    pub fn with_max_decompressed_size(mut self, max: usize) -> Self {
        self.max_decompressed_size = max;
        self
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn max_decompressed_size(&self) -> usize {
        self.max_decompressed_size
    }
}

impl PayloadFilter for DeflateFilter {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(data)
            .map_err(|err| FrameError::Compression(err.to_string()))?;
        encoder
            .finish()
            .map_err(|err| FrameError::Compression(err.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        read_capped(ZlibDecoder::new(data), self.max_decompressed_size)
    }
}

/// zstd filter with a bounded decompression buffer. Opt-in; both ends of
/// a connection must agree on it.
#[derive(Debug, Clone)]
pub struct ZstdFilter {
    level: i32,
    max_decompressed_size: usize,
}

impl Default for ZstdFilter {
    fn default() -> Self {
        Self {
            level: DEFAULT_ZSTD_LEVEL,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }
}

impl ZstdFilter {
    pub fn new(level: i32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_max_decompressed_size(mut self, max: usize) -> Self {
        self.max_decompressed_size = max;
        self
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn max_decompressed_size(&self) -> usize {
        self.max_decompressed_size
    }
}

impl PayloadFilter for ZstdFilter {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        zstd::stream::copy_encode(data, &mut out, self.level)
            .map_err(|err| FrameError::Compression(err.to_string()))?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let reader = zstd::stream::Decoder::new(data)
            .map_err(|err| FrameError::Decompression(err.to_string()))?;
        read_capped(reader, self.max_decompressed_size)
    }
}

fn read_capped<R: Read>(mut reader: R, max: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; DECOMPRESS_CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut chunk)
            .map_err(|err| FrameError::Decompression(err.to_string()))?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
        if out.len() > max {
            return Err(FrameError::Decompression(format!(
                "output exceeds {max} bytes"
            )));
        }
    }
}

/// Pass-through filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl PayloadFilter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
