//! A collection of tools for streaming bytes between threads. Currently it re-exports the
//! `byte_buffer` crate: status-tracked shared buffers, producer/consumer channels, pull-based
//! external sources and threaded processing pipelines.
//!
//! ```
//! use stream_tools::prelude::*;
//!
//! let buffer = SharedBuffer::from("abc");
//! buffer.set_status(Status::EoF).unwrap();
//!
//! assert_eq!(buffer.extract(5, ReadMode::Partial).unwrap(), b"abc");
//! ```

pub use byte_buffer::*;
