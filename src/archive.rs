//! Sequential gzip-wrapped container of named payloads.
//!
//! Each entry is a big-endian `u16` name length, the UTF-8 name, a
//! big-endian `u32` payload length and the payload. There is no trailer:
//! the stream ends where the next name length would start.

use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

pub struct ArchiveWriter<W: Write> {
    encoder: GzEncoder<W>,
    entries: usize,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(output: W) -> Self {
        ArchiveWriter {
            encoder: GzEncoder::new(output, Compression::default()),
            entries: 0,
        }
    }

    pub fn append(&mut self, name: &str, payload: &[u8]) -> Result<()> {
        let name_len = u16::try_from(name.len())
            .with_context(|| format!("entry name too long: {name}"))?;
        let payload_len = u32::try_from(payload.len())
            .with_context(|| format!("entry payload too large: {name}"))?;
        self.encoder.write_all(&name_len.to_be_bytes())?;
        self.encoder.write_all(name.as_bytes())?;
        self.encoder.write_all(&payload_len.to_be_bytes())?;
        self.encoder
            .write_all(payload)
            .with_context(|| format!("failed to write entry {name}"))?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Flushes the compressed stream and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.encoder.finish().context("failed to finish archive")
    }
}

pub struct ArchiveReader<R: Read> {
    decoder: GzDecoder<R>,
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(input: R) -> Self {
        ArchiveReader {
            decoder: GzDecoder::new(input),
        }
    }

    /// Next `(name, payload)` pair, or `None` at a clean end of stream.
    /// Running out of input anywhere inside an entry is an error.
    pub fn next_entry(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        let mut name_len = [0u8; 2];
        match self.decoder.read(&mut name_len[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(error) => return Err(error).context("failed to read archive entry header"),
        }
        self.decoder
            .read_exact(&mut name_len[1..])
            .context("truncated archive entry header")?;
        let mut name = vec![0u8; usize::from(u16::from_be_bytes(name_len))];
        self.decoder
            .read_exact(&mut name)
            .context("truncated archive entry name")?;
        let name = String::from_utf8(name).context("archive entry name is not UTF-8")?;

        let mut payload_len = [0u8; 4];
        self.decoder
            .read_exact(&mut payload_len)
            .with_context(|| format!("truncated archive entry {name}"))?;
        let payload_len = u32::from_be_bytes(payload_len) as usize;
        let mut payload = Vec::new();
        (&mut self.decoder)
            .take(payload_len as u64)
            .read_to_end(&mut payload)
            .with_context(|| format!("failed to read archive entry {name}"))?;
        if payload.len() != payload_len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
                .with_context(|| format!("truncated archive entry {name}"));
        }
        Ok(Some((name, payload)))
    }

    pub fn entries(mut self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
