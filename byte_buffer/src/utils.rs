use crate::error::{BufferError, Result};
use std::fmt::{self, Write};
use std::ops::BitOr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// The longest a blocking read sleeps before re-checking the buffer, even when no wake-up
/// has been delivered.
pub const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Consumed prefix length after which a `ByteStore` may move its live bytes to the front.
pub(crate) const COMPACT_THRESHOLD: usize = 4096;

/// Chunk size used when pulling from an `io::Read` source.
pub const DEFAULT_CHUNK: usize = 4096;

/// The life-cycle of a buffer. Only transitions out of `Ready` are allowed.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Open for both writes and reads
    Ready = 0,
    /// The producer finished, buffered bytes remain readable
    EoF = 1,
    /// The producer failed, readers shall stop
    Error = 2,
}

impl Status {
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != Status::Ready
    }

    #[inline]
    fn from_u8(val: u8) -> Status {
        match val {
            0 => Status::Ready,
            1 => Status::EoF,
            _ => Status::Error,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Ready
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ready => "ready",
            Status::EoF => "eof",
            Status::Error => "error",
        };

        f.write_str(name)
    }
}

/// Lock-free status word. Only the first terminal transition wins.
#[derive(Debug, Default)]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) fn new(status: Status) -> Self {
        AtomicStatus(AtomicU8::new(status as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `Ready` to `target`. Fails if `target` is `Ready`, or if the status has
    /// already been closed.
    pub(crate) fn close(&self, target: Status) -> Result<()> {
        if target == Status::Ready {
            return Err(BufferError::invalid_argument(
                "status",
                "a buffer can't be re-opened",
            ));
        }

        self.0
            .compare_exchange(
                Status::Ready as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|old| match Status::from_u8(old) {
                Status::Error => BufferError::NotReady,
                _ => BufferError::ReadOnly,
            })
    }
}

/// Whether a read waits for the full length to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Wait until the requested length is buffered, or the producer has finished
    Full,
    /// Take whatever is buffered right now, up to the requested length
    Partial,
}

impl Default for ReadMode {
    fn default() -> Self {
        ReadMode::Full
    }
}

/// Anchor flags for `seek` and `discard`, combinable with `|`.
///
/// The anchor is resolved in this order: `END` anchors at the end of the data, `RELATIVE`
/// at the read cursor, and `BEGIN` / `ABSOLUTE` (or no flag at all) at the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position(u8);

impl Position {
    pub const BEGIN: Position = Position(0b0001);
    pub const END: Position = Position(0b0010);
    pub const RELATIVE: Position = Position(0b0100);
    pub const ABSOLUTE: Position = Position(0b1000);

    #[inline]
    pub fn contains(self, other: Position) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    pub(crate) fn anchor(self, cursor: usize, len: usize) -> usize {
        if self.contains(Position::END) {
            len
        } else if self.contains(Position::RELATIVE) {
            cursor
        } else {
            0
        }
    }
}

impl BitOr for Position {
    type Output = Position;

    fn bitor(self, rhs: Position) -> Position {
        Position(self.0 | rhs.0)
    }
}

/// Fixed-width numbers that can be written to and read from a byte stream. The encoding is the
/// platform's native byte order, so values shall only travel between stages of one process.
pub trait Scalar: Copy + Send + 'static {
    const SIZE: usize;

    fn put(self, dst: &mut Vec<u8>);

    /// `src` is exactly `SIZE` bytes long.
    fn take(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn put(self, dst: &mut Vec<u8>) {
                    dst.extend_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn take(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&src[..Self::SIZE]);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

/// Format `data` as offset / hex / ascii rows, `columns` bytes per row. `cursor` marks the
/// read position with a `>` before its byte.
pub(crate) fn hex_dump(data: &[u8], cursor: usize, columns: usize) -> Result<String> {
    if columns == 0 {
        return Err(BufferError::invalid_argument(
            "columns",
            "a hex dump needs at least one column",
        ));
    }

    let mut out = String::with_capacity((data.len() / columns + 1) * (columns * 4 + 16));
    let _ = writeln!(out, "Length: {}, Position: {}", data.len(), cursor);

    for (row, chunk) in data.chunks(columns).enumerate() {
        let offset = row * columns;
        let _ = write!(out, "{:08x} ", offset);

        for col in 0..columns {
            let marker = if offset + col == cursor { '>' } else { ' ' };
            match chunk.get(col) {
                Some(byte) => {
                    let _ = write!(out, "{}{:02x}", marker, byte);
                }
                None => out.push_str("   "),
            }
        }

        out.push_str("  ");
        chunk.iter().for_each(|&b| {
            out.push(if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            });
        });

        out.push('\n');
    }

    Ok(out)
}
