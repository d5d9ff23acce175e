//! A `Channel` binds one producer and one consumer to a single `SharedBuffer`.
//!
//! The two capabilities are handed out as move-only values: a channel mints at most one
//! `Producer` and at most one `Consumer`, so the single-writer / single-destructive-reader
//! discipline that keeps the byte stream in FIFO order is enforced by ownership.
//!
//! ```
//! use byte_buffer::prelude::*;
//! use std::thread;
//!
//! let (mut producer, mut consumer) = channel();
//!
//! thread::spawn(move || {
//!     producer.write(b"hello").unwrap();
//!     producer.close().unwrap();
//! });
//!
//! assert_eq!(consumer.extract(5, ReadMode::Full).unwrap(), b"hello");
//! assert_eq!(consumer.wait(), Status::EoF);
//! ```

use crate::buffer::ByteStore;
use crate::error::{BufferError, Result};
use crate::shared::{SharedBuffer, StoreGuard};
use crate::utils::{ReadMode, Scalar, Status};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Core {
    buffer: SharedBuffer,
    producer_taken: AtomicBool,
    consumer_taken: AtomicBool,
}

/// Reference-counted handle to one shared buffer. Cloning the handle is cheap and does not
/// allow a second producer or consumer to be minted.
#[derive(Clone)]
pub struct Channel {
    core: Arc<Core>,
}

/// Create a fresh channel and take both of its ends.
pub fn channel() -> (Producer, Consumer) {
    Channel::new().split()
}

impl Channel {
    pub fn new() -> Self {
        Channel::from(ByteStore::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Channel::from(ByteStore::with_capacity(capacity))
    }

    /// Take the write end. Only the first call succeeds.
    pub fn producer(&self) -> Result<Producer> {
        if self.core.producer_taken.swap(true, Ordering::AcqRel) {
            return Err(BufferError::AlreadyTaken { role: "producer" });
        }

        Ok(Producer {
            core: Arc::clone(&self.core),
        })
    }

    /// Take the read end. Only the first call succeeds.
    pub fn consumer(&self) -> Result<Consumer> {
        if self.core.consumer_taken.swap(true, Ordering::AcqRel) {
            return Err(BufferError::AlreadyTaken { role: "consumer" });
        }

        Ok(Consumer {
            core: Arc::clone(&self.core),
        })
    }

    /// Take both ends of a brand new channel.
    pub(crate) fn split(self) -> (Producer, Consumer) {
        let producer = Producer {
            core: Arc::clone(&self.core),
        };
        let consumer = Consumer { core: self.core };

        producer.core.producer_taken.store(true, Ordering::Release);
        producer.core.consumer_taken.store(true, Ordering::Release);

        (producer, consumer)
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.core.buffer.status()
    }

    pub fn len(&self) -> usize {
        self.core.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.buffer.is_empty()
    }

    pub fn hex_dump(&self, columns: usize) -> Result<String> {
        self.core.buffer.hex_dump(columns)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::new()
    }
}

/// Seed a channel with bytes that are already known.
impl From<ByteStore> for Channel {
    fn from(store: ByteStore) -> Self {
        Channel {
            core: Arc::new(Core {
                buffer: SharedBuffer::from(store),
                producer_taken: AtomicBool::new(false),
                consumer_taken: AtomicBool::new(false),
            }),
        }
    }
}

impl From<Vec<u8>> for Channel {
    fn from(data: Vec<u8>) -> Self {
        Channel::from(ByteStore::from(data))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Channel").field(&self.core.buffer).finish()
    }
}

/// The write end of a channel. Writes never block.
///
/// Consumers wait until the producer closes the buffer, so it must end up with a terminal
/// status: call `close` on success and `fail` on error. Only an explicit `close` marks the
/// stream complete. A producer dropped while the buffer is still open, e.g. on an early return
/// or a panic, closes it with `Status::Error`, so a truncated stream never reads as finished.
pub struct Producer {
    core: Arc<Core>,
}

impl Producer {
    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        self.core.buffer.append(src)
    }

    pub fn write_str(&mut self, src: &str) -> Result<()> {
        self.core.buffer.append(src.as_bytes())
    }

    pub fn write_store(&mut self, src: &ByteStore) -> Result<()> {
        self.core.buffer.append_store(src)
    }

    pub fn write_scalar<T: Scalar>(&mut self, val: T) -> Result<()> {
        self.core.buffer.append_scalar(val)
    }

    pub fn reserve(&mut self, additional: usize) {
        self.core.buffer.reserve(additional);
    }

    pub fn set_status(&mut self, status: Status) -> Result<()> {
        self.core.buffer.set_status(status)
    }

    /// Finish the stream successfully.
    pub fn close(&mut self) -> Result<()> {
        self.set_status(Status::EoF)
    }

    /// Mark the stream as failed.
    pub fn fail(&mut self) -> Result<()> {
        self.set_status(Status::Error)
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.core.buffer.status()
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.core.buffer.is_writable()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if !self.core.buffer.is_writable() {
            return;
        }

        tracing::warn!(
            panicking = thread::panicking(),
            "producer dropped while the buffer was open, failing it"
        );

        // a concurrent close beat us to it, nothing to do then
        self.core.buffer.set_status(Status::Error).unwrap_or_default();
    }
}

impl io::Write for Producer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.core.buffer.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("status", &self.status())
            .finish()
    }
}

/// The read end of a channel. Every read is destructive: returned bytes are removed from the
/// buffer. Reads in `ReadMode::Full` block until enough bytes arrive or the producer closes
/// the buffer.
pub struct Consumer {
    core: Arc<Core>,
}

impl Consumer {
    /// Remove `count` bytes. In `Partial` mode, remove up to `count` bytes without waiting.
    pub fn extract(&mut self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
        self.core.buffer.extract(count, mode)
    }

    /// Remove everything buffered right now.
    pub fn extract_all(&mut self) -> Result<Vec<u8>> {
        self.core.buffer.extract_all()
    }

    pub fn extract_scalar<T: Scalar>(&mut self) -> Result<T> {
        self.core.buffer.extract_scalar()
    }

    /// `extract` in `Full` mode that gives up after `timeout`, returning `Ok(None)`.
    pub fn extract_timeout(&mut self, count: usize, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.core.buffer.extract_timeout(count, timeout)
    }

    /// Wait for the producer to finish and take the whole stream.
    pub fn drain(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();

        loop {
            let status = self.core.buffer.wait();
            out.extend(self.core.buffer.extract_all()?);

            // the status was read before extracting, so an EoF here means nothing is left
            match status {
                Status::Ready => continue,
                Status::EoF => return Ok(out),
                Status::Error => return Err(BufferError::NotReady),
            }
        }
    }

    pub fn peek(&self, mode: ReadMode) -> Result<u8> {
        self.core.buffer.peek(mode)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.core.buffer.skip(count)
    }

    /// Exclusive access to the buffered bytes, e.g. to work on them in place.
    pub fn lock(&mut self) -> StoreGuard<'_> {
        self.core.buffer.lock()
    }

    /// Block until there's something to read or the buffer is closed.
    pub fn wait(&self) -> Status {
        self.core.buffer.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Status {
        self.core.buffer.wait_timeout(timeout)
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.core.buffer.status()
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.core.buffer.is_readable()
    }

    pub fn has_enough_data(&self, count: usize) -> bool {
        self.core.buffer.has_enough_data(count)
    }

    pub fn len(&self) -> usize {
        self.core.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.buffer.is_empty()
    }
}

impl io::Read for Consumer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.wait() == Status::Error {
            return Err(BufferError::NotReady.into());
        }

        let bytes = self.core.buffer.extract(buf.len(), ReadMode::Partial)?;
        buf[..bytes.len()].copy_from_slice(&bytes);

        Ok(bytes.len())
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("status", &self.status())
            .field("len", &self.len())
            .finish()
    }
}
