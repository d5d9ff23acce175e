//! A buffer that fills itself on demand from an outside source, like a file, a socket or a
//! generator.
//!
//! Before answering a read, an `ExternalSource` calls its `Pull` function until the request
//! can be served or the source says it's done: `PullError::Exhausted` closes the buffer
//! with `Status::EoF`, `PullError::Failed` closes it with `Status::Error`. From then on it
//! behaves exactly like a closed `SharedBuffer`.

use crate::buffer::ByteStore;
use crate::error::{BufferError, Result};
use crate::shared::SharedBuffer;
use crate::utils::{ReadMode, Scalar, Status, DEFAULT_CHUNK};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::thread;

/// Why a pull function stopped producing data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PullError {
    /// The source is finished, no more data will come
    #[error("source exhausted")]
    Exhausted,

    /// The source broke down
    #[error("source failed: {0}")]
    Failed(String),
}

/// Fetch the next chunk from a source. An empty chunk is fine and just means "nothing yet";
/// the pull is simply tried again. Implementations shall not block forever.
pub trait Pull: Send {
    fn pull(&mut self) -> std::result::Result<Vec<u8>, PullError>;
}

impl<F> Pull for F
where
    F: FnMut() -> std::result::Result<Vec<u8>, PullError> + Send,
{
    fn pull(&mut self) -> std::result::Result<Vec<u8>, PullError> {
        self()
    }
}

/// Pull adapter over any `io::Read`.
struct ReaderPull<R> {
    reader: R,
    chunk: usize,
}

impl<R: io::Read + Send> Pull for ReaderPull<R> {
    fn pull(&mut self) -> std::result::Result<Vec<u8>, PullError> {
        let mut buf = vec![0u8; self.chunk];

        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Err(PullError::Exhausted),
                Ok(size) => {
                    buf.truncate(size);
                    return Ok(buf);
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(PullError::Failed(err.to_string())),
            }
        }
    }
}

pub struct ExternalSource {
    buffer: SharedBuffer,
    source: Mutex<Box<dyn Pull>>,
    failure: Mutex<Option<String>>,
}

impl ExternalSource {
    pub fn new<P>(source: P) -> Self
    where
        P: Pull + 'static,
    {
        ExternalSource {
            buffer: SharedBuffer::new(),
            source: Mutex::new(Box::new(source)),
            failure: Mutex::new(None),
        }
    }

    /// Read from `reader` in chunks of `DEFAULT_CHUNK` bytes.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: io::Read + Send + 'static,
    {
        Self::from_reader_with_chunk(reader, DEFAULT_CHUNK)
    }

    pub fn from_reader_with_chunk<R>(reader: R, chunk: usize) -> Self
    where
        R: io::Read + Send + 'static,
    {
        Self::new(ReaderPull {
            reader,
            chunk: chunk.max(1),
        })
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.buffer.status()
    }

    /// The message of the pull failure that closed this source, if any.
    pub fn last_failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Bytes buffered so far, no pulling involved.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn has_enough_data(&self, count: usize) -> bool {
        self.fill(|store| store.has_enough_data(count));
        self.buffer.has_enough_data(count)
    }

    pub fn read(&self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
        self.fill(|store| store.has_enough_data(count));
        self.buffer.read(count, mode)
    }

    pub fn extract(&self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
        self.fill(|store| store.len() >= count);
        self.buffer.extract(count, mode)
    }

    pub fn extract_scalar<T: Scalar>(&self) -> Result<T> {
        self.fill(|store| store.len() >= T::SIZE);
        self.buffer.extract_scalar()
    }

    pub fn peek(&self, mode: ReadMode) -> Result<u8> {
        self.fill(|store| store.has_enough_data(1));
        self.buffer.peek(mode)
    }

    pub fn skip(&self, count: usize) -> Result<()> {
        self.fill(|store| store.len() >= count);
        self.buffer.skip(count)
    }

    /// Pull the source dry and take everything.
    pub fn extract_to_end(&self) -> Result<Vec<u8>> {
        self.fill(|_| false);

        match self.status() {
            Status::Error => Err(BufferError::NotReady),
            _ => self.buffer.extract_all(),
        }
    }

    /// Call the pull function until `enough` holds or the source closes.
    fn fill<F>(&self, enough: F)
    where
        F: Fn(&ByteStore) -> bool,
    {
        let mut source = self.source.lock();

        while self.buffer.is_writable() && !self.buffer.inspect(&enough) {
            match source.pull() {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        thread::yield_now();
                        continue;
                    }

                    if let Err(err) = self.buffer.append(&chunk) {
                        tracing::debug!(%err, "source closed while pulling");
                        return;
                    }
                }
                Err(PullError::Exhausted) => {
                    tracing::debug!(len = self.buffer.len(), "external source exhausted");
                    self.buffer.set_status(Status::EoF).unwrap_or_default();
                }
                Err(PullError::Failed(message)) => {
                    tracing::warn!(%message, "external source failed");
                    *self.failure.lock() = Some(message);
                    self.buffer.set_status(Status::Error).unwrap_or_default();
                }
            }
        }
    }
}

impl io::Read for ExternalSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let bytes = ExternalSource::extract(self, buf.len(), ReadMode::Partial)?;
        buf[..bytes.len()].copy_from_slice(&bytes);

        Ok(bytes.len())
    }
}

impl fmt::Debug for ExternalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSource")
            .field("buffer", &self.buffer)
            .field("failure", &*self.failure.lock())
            .finish()
    }
}

#[cfg(test)]
mod external_tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn counter(limit: u8, step: u8) -> impl FnMut() -> std::result::Result<Vec<u8>, PullError> {
        let mut next = 0u8;

        move || {
            if next >= limit {
                return Err(PullError::Exhausted);
            }

            let end = next.saturating_add(step).min(limit);
            let chunk: Vec<u8> = (next..end).collect();
            next = end;

            Ok(chunk)
        }
    }

    #[test]
    fn pulls_on_demand() {
        let source = ExternalSource::new(counter(20, 3));
        assert!(source.is_empty());

        assert_eq!(source.extract(4, ReadMode::Full).unwrap(), vec![0, 1, 2, 3]);
        // only what was needed got pulled: two chunks of three
        assert_eq!(source.len(), 2);
        assert_eq!(source.status(), Status::Ready);

        assert_eq!(source.extract_to_end().unwrap(), (4..20).collect::<Vec<u8>>());
        assert_eq!(source.status(), Status::EoF);
    }

    #[test]
    fn exhausted_means_eof() {
        let source = ExternalSource::new(counter(5, 2));

        assert!(source.has_enough_data(5));
        assert!(!source.has_enough_data(6));
        assert_eq!(source.status(), Status::EoF);

        assert_eq!(
            source.extract(6, ReadMode::Full),
            Err(BufferError::overflow(6, 5))
        );
        assert_eq!(source.extract(6, ReadMode::Partial).unwrap().len(), 5);
    }

    #[test]
    fn failure_means_error() {
        let mut calls = 0;
        let source = ExternalSource::new(move || {
            calls += 1;
            if calls > 2 {
                Err(PullError::Failed("disk on fire".to_string()))
            } else {
                Ok(vec![calls as u8])
            }
        });

        assert_eq!(source.peek(ReadMode::Full).unwrap(), 1);
        assert_eq!(source.extract(3, ReadMode::Full), Err(BufferError::NotReady));
        assert_eq!(source.status(), Status::Error);
        assert_eq!(source.last_failure().as_deref(), Some("disk on fire"));
        assert!(source.extract_to_end().is_err());
    }

    #[test]
    fn empty_chunks_are_retried() {
        let mut calls = 0u32;
        let source = ExternalSource::new(move || {
            calls += 1;
            match calls {
                1 | 2 => Ok(Vec::new()),
                3 => Ok(b"late".to_vec()),
                _ => Err(PullError::Exhausted),
            }
        });

        assert_eq!(source.extract(4, ReadMode::Full).unwrap(), b"late");
        assert_eq!(source.extract_to_end().unwrap(), b"");
    }

    #[test]
    fn reads_from_io() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = ExternalSource::from_reader_with_chunk(Cursor::new(data.clone()), 333);

        assert_eq!(source.read(5, ReadMode::Full).unwrap(), &data[..5]);
        source.skip(5).unwrap();

        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, &data[5..]);
    }
}
