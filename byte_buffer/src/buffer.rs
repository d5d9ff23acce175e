use crate::error::{BufferError, Result};
use crate::utils::{self, Position, Scalar, COMPACT_THRESHOLD};
use std::fmt;
use std::io;

/// A growable byte sequence with a read cursor. This is the plain, unsynchronized building
/// block: every method runs to completion immediately and none of them touch a lock, so
/// sharing it between threads is the job of the `SharedBuffer` wrapper.
///
/// Three kinds of reads are supported:
/// - `read` copies nothing and returns a view at the cursor, moving the cursor forward;
/// - `peek` looks at the byte under the cursor without moving it;
/// - `extract` removes bytes from the *start* of the sequence, regardless of the cursor, and
///   puts the cursor back at the start of what's left.
#[derive(Clone, Default)]
pub struct ByteStore {
    /// Raw storage, live bytes start at `head`
    data: Vec<u8>,

    /// Length of the already extracted prefix still held by `data`
    head: usize,

    /// Read cursor, counted from the first live byte
    cursor: usize,
}

impl ByteStore {
    pub fn new() -> Self {
        ByteStore::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteStore {
            data: Vec::with_capacity(capacity),
            head: 0,
            cursor: 0,
        }
    }

    /// Number of live bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity() - self.head
    }

    /// Where the read cursor currently is.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes between the cursor and the end of the data.
    #[inline]
    pub fn available(&self) -> usize {
        self.len() - self.cursor
    }

    #[inline]
    pub fn has_enough_data(&self, count: usize) -> bool {
        self.cursor
            .checked_add(count)
            .map_or(false, |end| end <= self.len())
    }

    /// All live bytes, ignoring the cursor.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[self.head..]
    }

    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    pub fn append(&mut self, src: &[u8]) {
        self.data.extend_from_slice(src);
    }

    /// Append all the live bytes of `other`.
    pub fn append_store(&mut self, other: &ByteStore) {
        self.append(other.data());
    }

    pub fn append_scalar<T: Scalar>(&mut self, val: T) {
        val.put(&mut self.data);
    }

    /// View the next `count` bytes from the cursor and move the cursor past them.
    pub fn read(&mut self, count: usize) -> Result<&[u8]> {
        if !self.has_enough_data(count) {
            return Err(BufferError::overflow(count, self.available()));
        }

        let start = self.head + self.cursor;
        self.cursor += count;

        Ok(&self.data[start..start + count])
    }

    pub fn read_scalar<T: Scalar>(&mut self) -> Result<T> {
        self.read(T::SIZE).map(T::take)
    }

    /// The byte under the cursor, the cursor stays.
    pub fn peek(&self) -> Result<u8> {
        self.data
            .get(self.head + self.cursor)
            .copied()
            .ok_or_else(|| BufferError::overflow(1, 0))
    }

    /// Remove and return the first `count` bytes of the sequence. Resets the cursor.
    pub fn extract(&mut self, count: usize) -> Result<Vec<u8>> {
        let len = self.len();
        if count > len {
            return Err(BufferError::overflow(count, len));
        }

        let out = self.data[self.head..self.head + count].to_vec();
        self.consume(count);

        Ok(out)
    }

    /// Remove and return everything that is buffered.
    pub fn extract_all(&mut self) -> Vec<u8> {
        let out = if self.head == 0 {
            std::mem::replace(&mut self.data, Vec::new())
        } else {
            self.data[self.head..].to_vec()
        };

        self.clear();
        out
    }

    pub fn extract_scalar<T: Scalar>(&mut self) -> Result<T> {
        let len = self.len();
        if T::SIZE > len {
            return Err(BufferError::overflow(T::SIZE, len));
        }

        let val = T::take(&self.data[self.head..self.head + T::SIZE]);
        self.consume(T::SIZE);

        Ok(val)
    }

    /// Drop up to `count` bytes without returning them, and return how many were dropped. The
    /// dropped range starts at the beginning of the data, at the cursor (`RELATIVE`), or ends
    /// at the end of the data (`END`). Dropping from the beginning resets the cursor, like
    /// `extract` does.
    pub fn discard(&mut self, count: usize, mode: Position) -> usize {
        let len = self.len();
        let start = if mode.contains(Position::END) {
            len.saturating_sub(count)
        } else if mode.contains(Position::RELATIVE) {
            self.cursor
        } else {
            0
        };

        let count = count.min(len - start);
        if count == 0 {
            return 0;
        }

        if start == 0 {
            self.consume(count);
            return count;
        }

        let from = self.head + start;
        self.data.drain(from..from + count);

        if self.cursor > start {
            self.cursor -= (self.cursor - start).min(count);
        }

        count
    }

    /// Move the cursor by `offset` from the anchor picked by `mode`, clamped to the data.
    pub fn seek(&mut self, offset: isize, mode: Position) {
        let len = self.len();
        let base = mode.anchor(self.cursor, len) as isize;
        let target = base.saturating_add(offset);

        self.cursor = if target < 0 {
            0
        } else {
            (target as usize).min(len)
        };
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
        self.cursor = 0;
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.extract_all()
    }

    pub fn hex_dump(&self, columns: usize) -> Result<String> {
        utils::hex_dump(self.data(), self.cursor, columns)
    }

    fn consume(&mut self, count: usize) {
        self.head += count;
        self.cursor = 0;

        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head >= COMPACT_THRESHOLD && self.head * 2 >= self.data.len() {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }
}

impl PartialEq for ByteStore {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data() && self.cursor == other.cursor
    }
}

impl Eq for ByteStore {}

impl fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStore")
            .field("len", &self.len())
            .field("position", &self.cursor)
            .finish()
    }
}

impl From<Vec<u8>> for ByteStore {
    fn from(data: Vec<u8>) -> Self {
        ByteStore {
            data,
            head: 0,
            cursor: 0,
        }
    }
}

impl From<&[u8]> for ByteStore {
    fn from(src: &[u8]) -> Self {
        ByteStore::from(src.to_vec())
    }
}

impl From<&str> for ByteStore {
    fn from(src: &str) -> Self {
        ByteStore::from(src.as_bytes())
    }
}

impl From<String> for ByteStore {
    fn from(src: String) -> Self {
        ByteStore::from(src.into_bytes())
    }
}

impl io::Write for ByteStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod buffer_tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn append_and_read() {
        let mut store = ByteStore::from("hello");
        store.append(b", world");

        assert_eq!(store.len(), 12);
        assert_eq!(store.read(5).unwrap(), b"hello");
        assert_eq!(store.position(), 5);
        assert_eq!(store.available(), 7);

        // reading is not destructive
        assert_eq!(store.len(), 12);
        assert_eq!(store.peek().unwrap(), b',');
        assert_eq!(store.position(), 5);

        assert_eq!(
            store.read(8).unwrap_err(),
            BufferError::Overflow {
                requested: 8,
                available: 7
            }
        );
        assert_eq!(store.position(), 5);
    }

    #[test]
    fn peek_at_end() {
        let mut store = ByteStore::from(&b"ab"[..]);
        store.seek(0, Position::END);
        assert!(store.peek().is_err());
        assert!(ByteStore::new().peek().is_err());
    }

    #[test]
    fn extract_from_start() {
        let mut store = ByteStore::from("abcdef");
        store.read(4).unwrap();

        // extract ignores the cursor, then re-anchors it at the start
        assert_eq!(store.extract(3).unwrap(), b"abc");
        assert_eq!(store.position(), 0);
        assert_eq!(store.data(), b"def");
        assert_eq!(store.read(2).unwrap(), b"de");
        assert_eq!(store.position(), 2);

        assert!(store.extract(4).is_err());
        assert_eq!(store.extract_all(), b"def");
        assert!(store.is_empty());
        assert_eq!(store.position(), 0);
    }

    #[test]
    fn discard_modes() {
        let mut store = ByteStore::from("0123456789");
        assert_eq!(store.discard(2, Position::BEGIN), 2);
        assert_eq!(store.data(), b"23456789");

        assert_eq!(store.discard(3, Position::END), 3);
        assert_eq!(store.data(), b"23456");

        store.seek(2, Position::ABSOLUTE);
        assert_eq!(store.discard(10, Position::RELATIVE), 3);
        assert_eq!(store.data(), b"23");
        assert_eq!(store.position(), 2);

        store.seek(1, Position::BEGIN);
        assert_eq!(store.discard(1, Position::BEGIN), 1);
        assert_eq!(store.position(), 0);
        assert_eq!(store.data(), b"3");
    }

    #[test]
    fn seek_is_clamped() {
        let mut store = ByteStore::from("0123456789");

        store.seek(4, Position::BEGIN);
        assert_eq!(store.position(), 4);

        store.seek(3, Position::RELATIVE);
        assert_eq!(store.position(), 7);

        store.seek(-20, Position::RELATIVE);
        assert_eq!(store.position(), 0);

        store.seek(-2, Position::END);
        assert_eq!(store.position(), 8);

        store.seek(100, Position::ABSOLUTE);
        assert_eq!(store.position(), 10);
        assert!(!store.has_enough_data(1));
        assert!(store.has_enough_data(0));
    }

    #[test]
    fn scalars() {
        let mut store = ByteStore::new();
        for i in 0..4u32 {
            store.append_scalar(i * 10);
        }

        assert_eq!(store.read_scalar::<u32>().unwrap(), 0);
        assert_eq!(store.extract_scalar::<u32>().unwrap(), 0);
        assert_eq!(store.extract_scalar::<u32>().unwrap(), 10);
        assert_eq!(store.len(), 8);
        assert!(store.extract_scalar::<u64>().is_ok());
        assert!(store.extract_scalar::<u8>().is_err());
    }

    #[test]
    fn compaction_keeps_content() {
        let mut store = ByteStore::new();
        let payload: Vec<u8> = (0..=255u8).cycle().take(3 * COMPACT_THRESHOLD).collect();
        store.append(&payload);

        let mut out = Vec::new();
        while store.len() >= 1000 {
            out.extend(store.extract(1000).unwrap());
        }

        out.extend(store.extract_all());
        assert_eq!(out, payload);
    }

    #[test]
    fn equality_and_clone() {
        let mut a = ByteStore::from("xyz");
        let b = a.clone();
        assert_eq!(a, b);

        a.read(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.into_vec(), b"xyz");
    }

    proptest! {
        #[test]
        fn fifo_over_any_chunking(
            chunks in vec(vec(any::<u8>(), 0..64), 0..32),
            takes in vec(1usize..48, 1..64),
        ) {
            let mut store = ByteStore::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                store.append(chunk);
                expected.extend_from_slice(chunk);
            }

            let mut out = Vec::new();
            for take in takes {
                match store.extract(take) {
                    Ok(bytes) => out.extend(bytes),
                    Err(_) => break,
                }
            }

            out.extend(store.extract_all());
            prop_assert_eq!(out, expected);
        }
    }
}
