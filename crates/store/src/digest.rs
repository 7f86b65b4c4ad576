//! Content digest computation.
//!
//! Digests are sha-256 rendered as lowercase hex. Input is always streamed
//! through the hasher; nothing here buffers whole files in memory.

use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};

/// Hashes everything `reader` yields and returns the hex digest.
///
/// # Errors
///
/// Returns any [`io::Error`] raised while reading.
pub fn hash_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writer adapter that feeds every byte it writes into a sha-256 hasher.
///
/// Store operations wrap the destination file in one of these so the digest
/// always describes exactly the bytes that landed on disk, in the same pass
/// that wrote them.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Consumes the adapter, returning the inner writer and the hex digest
    /// of the bytes written so far.
    pub fn finalize(self) -> (W, String) {
        let Self { inner, hasher } = self;
        (inner, hex::encode(hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
