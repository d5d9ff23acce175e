//! This crate provides status-tracked byte buffers for streaming I/O between threads: a plain
//! `ByteStore`, a thread-safe `SharedBuffer` whose reads block until enough data arrives, a
//! `Channel` that splits a shared buffer into one `Producer` and one `Consumer`, an
//! `ExternalSource` that fills itself from a pull function or an `io::Read`, and a `Pipeline`
//! that chains processing stages, each running on its own thread.
//!
//! Every shared buffer carries a `Status`: `Ready` while the producer may still write, `EoF`
//! once it's done, and `Error` once it gave up. Reads never hang on a closed buffer: with
//! `ReadMode::Full` they fail with `BufferError::Overflow` if the data will never be there,
//! and `ReadMode::Partial` hands out whatever is left.
//!
//! To use this crate, add the crate dependency in your project's Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! byte_buffer = "0.2"
//! ```
//!
//! # Examples
//!
//! ```
//! use byte_buffer::prelude::*;
//! use std::thread;
//!
//! let (mut producer, mut consumer) = channel();
//!
//! let writer = thread::spawn(move || {
//!     for i in 0..10u32 {
//!         producer.write_scalar(i).unwrap();
//!     }
//!
//!     // dropping the producer without closing it would mark the stream as failed
//!     producer.close().unwrap();
//! });
//!
//! let mut sum = 0;
//! while let Ok(val) = consumer.extract_scalar::<u32>() {
//!     sum += val;
//! }
//!
//! assert_eq!(sum, 45);
//! assert_eq!(consumer.status(), Status::EoF);
//! writer.join().unwrap();
//! ```

pub mod buffer;
pub mod channel;
pub mod error;
pub mod external;
pub mod pipeline;
pub mod shared;
pub mod utils;
mod lock;

pub use crate::buffer::ByteStore;
pub use crate::channel::{channel, Channel, Consumer, Producer};
pub use crate::error::{BufferError, Result};
pub use crate::external::{ExternalSource, Pull, PullError};
pub use crate::pipeline::{Pipeline, PipelineHandle, Stage, StageReport};
pub use crate::shared::{SharedBuffer, StoreGuard};
pub use crate::utils::{Position, ReadMode, Scalar, Status};

pub mod prelude {
    pub use crate::buffer::ByteStore;
    pub use crate::channel::{channel, Channel, Consumer, Producer};
    pub use crate::error::{BufferError, Result};
    pub use crate::external::{ExternalSource, Pull, PullError};
    pub use crate::pipeline::{Pipeline, PipelineHandle, StageReport};
    pub use crate::shared::{SharedBuffer, StoreGuard};
    pub use crate::utils::{Position, ReadMode, Scalar, Status};
}
