use stream_tools::prelude::*;
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 100 bytes of 0b101, served 7 bytes at a time
    let mut source = ExternalSource::from_reader_with_chunk(io::repeat(0b101).take(100), 7);

    let head = source.extract(10, ReadMode::Full).unwrap();
    println!("First 10 bytes: {:?}, buffered: {}", head, source.len());

    let rest = source.extract_to_end().unwrap();
    println!("Remaining {} bytes, status: {}", rest.len(), source.status());
    assert_eq!(head.len() + rest.len(), 100);

    // a generator that breaks down after a few chunks
    let mut count = 0u8;
    let flaky = ExternalSource::new(move || {
        count += 1;
        if count > 3 {
            Err(PullError::Failed(format!("gave up after {} chunks", count - 1)))
        } else {
            Ok(vec![count; 4])
        }
    });

    match flaky.extract(64, ReadMode::Full) {
        Ok(bytes) => println!("Unexpected data: {:?}", bytes),
        Err(err) => println!(
            "Read failed: {} ({:?}), status: {}",
            err,
            flaky.last_failure(),
            flaky.status()
        ),
    }

    // the io::Read side stops cleanly at the end of an empty reader
    let mut empty = ExternalSource::from_reader(io::empty());
    let mut leftover = Vec::new();
    empty.read_to_end(&mut leftover).unwrap();
    println!("Empty reader gave {} bytes, status: {}", leftover.len(), empty.status());
}
