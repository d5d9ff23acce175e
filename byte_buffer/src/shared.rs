use crate::buffer::ByteStore;
use crate::error::{BufferError, Result};
use crate::lock::Signal;
use crate::utils::{AtomicStatus, Position, ReadMode, Scalar, Status};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// A `ByteStore` behind a reader/writer lock, plus a life-cycle `Status`.
///
/// Mutations take the exclusive lock, pure inspections take the shared one, and the status
/// is a lock-free atomic. On top of the plain store, reads in `ReadMode::Full` *block* until
/// enough bytes are buffered, failing only when the status says no more are coming:
///
/// - `Error` fails right away with `BufferError::NotReady`, even if data is buffered;
/// - `EoF` with too few bytes fails with `BufferError::Overflow`;
/// - otherwise the caller sleeps until a writer appends or changes the status.
pub struct SharedBuffer {
    store: RwLock<ByteStore>,
    status: AtomicStatus,
    signal: Signal,
}

impl SharedBuffer {
    pub fn new() -> Self {
        SharedBuffer::from(ByteStore::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SharedBuffer::from(ByteStore::with_capacity(capacity))
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status.load()
    }

    /// Close the buffer with `EoF` or `Error`. Fails if it's closed already.
    ///
    /// The status flips under the exclusive lock, so no append can land after it.
    pub fn set_status(&self, status: Status) -> Result<()> {
        {
            let _store = self.store.write();
            self.status.close(status)?;
        }

        tracing::trace!(%status, "buffer closed");

        self.signal.notify();
        Ok(())
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.status() != Status::Error
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.status() == Status::Ready
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    pub fn position(&self) -> usize {
        self.store.read().position()
    }

    pub fn available(&self) -> usize {
        self.store.read().available()
    }

    pub fn has_enough_data(&self, count: usize) -> bool {
        self.store.read().has_enough_data(count)
    }

    /// Run `f` against the store under the shared lock.
    pub fn inspect<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&ByteStore) -> R,
    {
        f(&self.store.read())
    }

    /// Copy of the buffered bytes, the buffer is left untouched.
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.read().data().to_vec()
    }

    pub fn hex_dump(&self, columns: usize) -> Result<String> {
        self.store.read().hex_dump(columns)
    }

    /// Take the exclusive lock for a multi-step critical section. Waiting readers are woken
    /// when the guard is dropped. Other methods of this buffer block until then, so don't
    /// call them from the thread holding the guard.
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            store: Some(self.store.write()),
            signal: &self.signal,
        }
    }

    pub fn reserve(&self, additional: usize) {
        self.store.write().reserve(additional);
    }

    pub fn append(&self, src: &[u8]) -> Result<()> {
        self.write_with(|store| store.append(src))
    }

    pub fn append_store(&self, other: &ByteStore) -> Result<()> {
        self.write_with(|store| store.append_store(other))
    }

    pub fn append_scalar<T: Scalar>(&self, val: T) -> Result<()> {
        self.write_with(|store| store.append_scalar(val))
    }

    /// Copy `count` bytes from the cursor and move the cursor past them.
    pub fn read(&self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
        match mode {
            ReadMode::Partial => self.now(|store| {
                let count = count.min(store.available());
                store.read(count).map(<[u8]>::to_vec)
            }),
            ReadMode::Full => self.blocking(
                count,
                ByteStore::available,
                |store| store.read(count).map(<[u8]>::to_vec),
                None,
            ),
        }
    }

    /// Remove and return `count` bytes from the start of the buffer.
    pub fn extract(&self, count: usize, mode: ReadMode) -> Result<Vec<u8>> {
        match mode {
            ReadMode::Partial => self.now(|store| {
                let count = count.min(store.len());
                store.extract(count)
            }),
            ReadMode::Full => {
                self.blocking(count, ByteStore::len, |store| store.extract(count), None)
            }
        }
    }

    /// Like `extract` in `ReadMode::Full`, but gives up once `timeout` elapses. A time-out is
    /// reported as `Ok(None)`.
    pub fn extract_timeout(&self, count: usize, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let res = self.blocking(
            count,
            ByteStore::len,
            |store| store.extract(count),
            Some(deadline),
        );

        match res {
            Ok(bytes) => Ok(Some(bytes)),
            Err(BufferError::Overflow { .. }) if !self.status().is_terminal() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Remove everything buffered right now, never blocks.
    pub fn extract_all(&self) -> Result<Vec<u8>> {
        self.now(|store| Ok(store.extract_all()))
    }

    /// Remove a fixed-width value from the start of the buffer, waiting for its bytes.
    pub fn extract_scalar<T: Scalar>(&self) -> Result<T> {
        self.blocking(T::SIZE, ByteStore::len, ByteStore::extract_scalar::<T>, None)
    }

    /// The byte under the cursor; `Full` waits for it to show up.
    pub fn peek(&self, mode: ReadMode) -> Result<u8> {
        match mode {
            ReadMode::Partial => {
                self.check_readable()?;
                self.store.read().peek()
            }
            ReadMode::Full => self.blocking(1, ByteStore::available, |store| store.peek(), None),
        }
    }

    /// Extract `count` bytes and throw them away.
    pub fn skip(&self, count: usize) -> Result<()> {
        self.blocking(
            count,
            ByteStore::len,
            |store| {
                store.discard(count, Position::BEGIN);
                Ok(())
            },
            None,
        )
    }

    pub fn discard(&self, count: usize, mode: Position) -> Result<usize> {
        self.now(|store| Ok(store.discard(count, mode)))
    }

    pub fn seek(&self, offset: isize, mode: Position) -> Result<()> {
        self.now(|store| {
            store.seek(offset, mode);
            Ok(())
        })
    }

    /// Block until the buffer holds some bytes or gets closed, and return the status seen.
    pub fn wait(&self) -> Status {
        self.wait_inner(None)
    }

    /// Same as `wait`, but returns whatever the status is once `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Status {
        self.wait_inner(Some(Instant::now() + timeout))
    }

    fn wait_inner(&self, deadline: Option<Instant>) -> Status {
        self.signal
            .wait_until(deadline, || {
                let status = self.status();
                if status.is_terminal() || !self.store.read().is_empty() {
                    Some(status)
                } else {
                    None
                }
            })
            .unwrap_or_else(|| self.status())
    }

    fn check_readable(&self) -> Result<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(BufferError::NotReady)
        }
    }

    fn check_writable(&self) -> Result<()> {
        match self.status() {
            Status::Ready => Ok(()),
            Status::EoF => Err(BufferError::ReadOnly),
            Status::Error => Err(BufferError::NotReady),
        }
    }

    fn write_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ByteStore),
    {
        {
            let mut store = self.store.write();
            self.check_writable()?;
            f(&mut store);
        }

        self.signal.notify();
        Ok(())
    }

    /// Non-blocking operation under the exclusive lock, rejected once the buffer failed.
    fn now<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ByteStore) -> Result<T>,
    {
        self.check_readable()?;
        let res = f(&mut self.store.write());

        self.signal.notify();
        res
    }

    /// Wait until `have(store) >= need`, then run `op` under the same exclusive lock.
    fn blocking<T, H, F>(&self, need: usize, have: H, op: F, deadline: Option<Instant>) -> Result<T>
    where
        H: Fn(&ByteStore) -> usize,
        F: FnOnce(&mut ByteStore) -> Result<T>,
    {
        let mut op = Some(op);

        let res = self.signal.wait_until(deadline, || {
            // read the status before the data: if it already said EoF, the data is final
            let status = self.status();
            if status == Status::Error {
                return Some(Err(BufferError::NotReady));
            }

            let mut store = self.store.write();
            let got = have(&store);

            if got >= need {
                return op.take().map(|op| op(&mut store));
            }

            if status == Status::EoF {
                return Some(Err(BufferError::overflow(need, got)));
            }

            None
        });

        match res {
            Some(res) => {
                self.signal.notify();
                res
            }
            None => Err(BufferError::overflow(need, have(&self.store.read()))),
        }
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        SharedBuffer::new()
    }
}

impl From<ByteStore> for SharedBuffer {
    fn from(store: ByteStore) -> Self {
        SharedBuffer {
            store: RwLock::new(store),
            status: AtomicStatus::new(Status::Ready),
            signal: Signal::new(),
        }
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(data: Vec<u8>) -> Self {
        SharedBuffer::from(ByteStore::from(data))
    }
}

impl From<&[u8]> for SharedBuffer {
    fn from(data: &[u8]) -> Self {
        SharedBuffer::from(ByteStore::from(data))
    }
}

impl From<&str> for SharedBuffer {
    fn from(data: &str) -> Self {
        SharedBuffer::from(ByteStore::from(data))
    }
}

impl From<String> for SharedBuffer {
    fn from(data: String) -> Self {
        SharedBuffer::from(ByteStore::from(data))
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("status", &self.status())
            .field("store", &*self.store.read())
            .finish()
    }
}

/// Exclusive access to the store of a `SharedBuffer`, released on drop.
pub struct StoreGuard<'a> {
    store: Option<RwLockWriteGuard<'a, ByteStore>>,
    signal: &'a Signal,
}

impl<'a> Deref for StoreGuard<'a> {
    type Target = ByteStore;

    fn deref(&self) -> &ByteStore {
        // only emptied in `drop`
        self.store.as_ref().unwrap()
    }
}

impl<'a> DerefMut for StoreGuard<'a> {
    fn deref_mut(&mut self) -> &mut ByteStore {
        self.store.as_mut().unwrap()
    }
}

impl<'a> Drop for StoreGuard<'a> {
    fn drop(&mut self) {
        // release the lock before waking anyone up
        self.store.take();
        self.signal.notify();
    }
}

#[cfg(test)]
mod shared_tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn round_trip() {
        let buffer = SharedBuffer::new();
        buffer.append(b"round trip").unwrap();

        assert_eq!(buffer.extract(10, ReadMode::Full).unwrap(), b"round trip");
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_matches_full_when_enough() {
        let a = SharedBuffer::from("abcdefgh");
        let b = SharedBuffer::from("abcdefgh");

        assert!(a.has_enough_data(5));
        assert_eq!(
            a.extract(5, ReadMode::Partial).unwrap(),
            b.extract(5, ReadMode::Full).unwrap()
        );

        // partial takes what's there
        assert_eq!(a.extract(10, ReadMode::Partial).unwrap(), b"fgh");
        assert_eq!(a.extract(10, ReadMode::Partial).unwrap(), b"");
    }

    #[test]
    fn overflow_after_eof() {
        let buffer = SharedBuffer::new();
        buffer.set_status(Status::EoF).unwrap();

        let err = buffer.extract(1, ReadMode::Full).unwrap_err();
        assert_eq!(err, BufferError::overflow(1, 0));
        assert!(buffer.peek(ReadMode::Full).is_err());
    }

    #[test]
    fn eof_keeps_data_readable() {
        let buffer = SharedBuffer::new();
        buffer.append(b"0123456789").unwrap();
        buffer.set_status(Status::EoF).unwrap();

        assert_eq!(buffer.append(b"x"), Err(BufferError::ReadOnly));
        assert_eq!(buffer.read(3, ReadMode::Full).unwrap(), b"012");
        assert_eq!(buffer.extract(4, ReadMode::Full).unwrap(), b"0123");
        assert_eq!(buffer.extract(6, ReadMode::Full).unwrap(), b"456789");
        assert!(buffer.extract(1, ReadMode::Full).is_err());
    }

    #[test]
    fn error_is_final() {
        let buffer = SharedBuffer::from("data");
        buffer.set_status(Status::Error).unwrap();

        assert!(!buffer.is_readable());
        assert!(!buffer.is_writable());
        assert_eq!(buffer.append(b"more"), Err(BufferError::NotReady));
        assert_eq!(buffer.extract(1, ReadMode::Full), Err(BufferError::NotReady));
        assert_eq!(buffer.extract(1, ReadMode::Partial), Err(BufferError::NotReady));
        assert_eq!(buffer.extract_all(), Err(BufferError::NotReady));
        assert_eq!(buffer.set_status(Status::EoF), Err(BufferError::NotReady));
        assert_eq!(buffer.status(), Status::Error);
    }

    #[test]
    fn blocks_until_data() {
        let buffer = Arc::new(SharedBuffer::new());

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                buffer.append(b"abc").unwrap();
                thread::sleep(Duration::from_millis(30));
                buffer.append(b"de").unwrap();
                buffer.set_status(Status::EoF).unwrap();
            })
        };

        assert_eq!(buffer.extract(5, ReadMode::Full).unwrap(), b"abcde");
        writer.join().unwrap();
    }

    #[test]
    fn error_wakes_blocked_reader() {
        let buffer = Arc::new(SharedBuffer::new());

        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.extract(4, ReadMode::Full))
        };

        thread::sleep(Duration::from_millis(20));
        buffer.append(b"ab").unwrap();
        buffer.set_status(Status::Error).unwrap();

        assert_eq!(reader.join().unwrap(), Err(BufferError::NotReady));
    }

    #[test]
    fn timed_extract() {
        let buffer = SharedBuffer::from("ab");
        assert_eq!(
            buffer.extract_timeout(3, Duration::from_millis(20)).unwrap(),
            None
        );
        assert_eq!(
            buffer.extract_timeout(2, Duration::from_millis(20)).unwrap(),
            Some(b"ab".to_vec())
        );

        buffer.set_status(Status::EoF).unwrap();
        assert!(buffer.extract_timeout(1, Duration::from_millis(20)).is_err());
    }

    #[test]
    fn wait_returns_on_data_or_close() {
        let buffer = SharedBuffer::new();
        assert_eq!(buffer.wait_timeout(Duration::from_millis(10)), Status::Ready);

        buffer.append(b"x").unwrap();
        assert_eq!(buffer.wait(), Status::Ready);

        buffer.set_status(Status::EoF).unwrap();
        assert_eq!(buffer.wait(), Status::EoF);
    }

    #[test]
    fn guard_section() {
        let buffer = Arc::new(SharedBuffer::new());

        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.extract(6, ReadMode::Full))
        };

        {
            let mut store = buffer.lock();
            store.append(b"abc");
            store.append(b"def");
            assert_eq!(store.read(3).unwrap(), b"abc");
        }

        assert_eq!(reader.join().unwrap().unwrap(), b"abcdef");
    }

    #[test]
    fn no_append_after_close() {
        let buffer = Arc::new(SharedBuffer::new());

        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut written = 0;
                while buffer.append(b"x").is_ok() {
                    written += 1;
                }
                written
            })
        };

        thread::sleep(Duration::from_millis(10));
        buffer.set_status(Status::EoF).unwrap();
        let len_at_close = buffer.len();

        let written = writer.join().unwrap();
        assert_eq!(buffer.len(), len_at_close);
        assert_eq!(written, len_at_close);
    }

    #[test]
    fn cursor_ops() {
        let buffer = SharedBuffer::from("0123456789");

        assert_eq!(buffer.peek(ReadMode::Partial).unwrap(), b'0');
        buffer.seek(4, Position::BEGIN).unwrap();
        assert_eq!(buffer.position(), 4);
        assert_eq!(buffer.available(), 6);
        assert_eq!(buffer.read(2, ReadMode::Partial).unwrap(), b"45");

        assert_eq!(buffer.discard(2, Position::END).unwrap(), 2);
        assert_eq!(buffer.snapshot(), b"01234567");

        // a destructive read puts the cursor back at the start
        buffer.skip(3).unwrap();
        assert_eq!(buffer.snapshot(), b"34567");
        assert_eq!(buffer.position(), 0);
        assert!(buffer.hex_dump(4).unwrap().contains("Length: 5"));
    }
}
