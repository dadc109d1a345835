//! Reading and writing streams of [`KeyValue`] records.
//!
//! Each record is one JSON object followed by a newline. The stream is
//! decoded incrementally; a clean end of input ends the stream and anything
//! else that fails to parse, including trailing garbage, is an error.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;

use crate::KeyValue;

/// Encodes records into a byte sink.
pub struct KeyValueWriter<W: Write> {
    inner: W,
}

impl<W: Write> KeyValueWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write(&mut self, kv: &KeyValue) -> Result<()> {
        serde_json::to_writer(&mut self.inner, kv)?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes the sink and hands it back.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl KeyValueWriter<BufWriter<File>> {
    /// Creates (or truncates) `path` and writes records to it.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

/// Decodes records from a byte source.
pub struct KeyValueReader<R: Read> {
    stream: StreamDeserializer<'static, IoRead<R>, KeyValue>,
}

impl<R: Read> KeyValueReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            stream: serde_json::Deserializer::from_reader(inner).into_iter(),
        }
    }
}

impl<R: Read> Iterator for KeyValueReader<R> {
    type Item = Result<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream
            .next()
            .map(|item| item.context("malformed key-value record"))
    }
}

impl KeyValueReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

/// Decodes every record in `path`, failing on the first bad one.
pub fn read_all(path: &Path) -> Result<Vec<KeyValue>> {
    KeyValueReader::open(path)?
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("failed to decode {}", path.display()))
}
