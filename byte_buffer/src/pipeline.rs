//! Multi-stage byte pipelines. Each stage is a function reading from a `Consumer` and writing
//! to a `Producer`; `Pipeline::process` wires the stages together with fresh channels and runs
//! every stage on its own thread, all at the same time.
//!
//! A stage owns the status of its output: it shall `close` it once its input is drained, and
//! `fail` it when the input reports an error or the stage itself can't go on. A stage that
//! returns without doing either, or panics, gets its output failed when the producer drops.
//!
//! ```
//! use byte_buffer::prelude::*;
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_stage(|mut input: Consumer, mut output: Producer| {
//!     match input.drain() {
//!         Ok(bytes) => {
//!             let upper: Vec<u8> = bytes.to_ascii_uppercase();
//!             output.write(&upper).and_then(|_| output.close()).unwrap_or_default();
//!         }
//!         Err(_) => output.fail().unwrap_or_default(),
//!     }
//! });
//!
//! let (mut result, handle) = pipeline.process("shout").unwrap();
//! assert_eq!(result.drain().unwrap(), b"SHOUT");
//! assert!(handle.wait().iter().all(|report| report.succeeded()));
//! ```

use crate::buffer::ByteStore;
use crate::channel::{Channel, Consumer, Producer};
use crate::error::{BufferError, Result};
use crate::utils::Status;
use crossbeam_channel::{self as channel, Receiver, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A pipeline stage: read from the first argument, write to the second.
pub type Stage = Arc<dyn Fn(Consumer, Producer) + Send + Sync + 'static>;

/// What became of a stage once its thread finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Position of the stage in the pipeline
    pub index: usize,

    /// Name given to the stage thread
    pub name: String,

    /// Status of the stage's output when the stage returned
    pub status: Status,

    /// If the stage function panicked
    pub panicked: bool,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        !self.panicked && self.status == Status::EoF
    }
}

pub struct Pipeline {
    name: String,
    stack_size: Option<usize>,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::named("pipeline")
    }

    /// Stage threads are named `<name>-<index>`.
    pub fn named(name: impl Into<String>) -> Self {
        Pipeline {
            name: name.into(),
            stack_size: None,
            stages: Vec::new(),
        }
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn add_stage<F>(&mut self, stage: F) -> &mut Self
    where
        F: Fn(Consumer, Producer) + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the pipeline over bytes that are all known upfront. Returns the consumer of the
    /// last stage, and a handle to the stage threads.
    pub fn process<B>(&self, input: B) -> Result<(Consumer, PipelineHandle)>
    where
        B: Into<ByteStore>,
    {
        let link = Channel::from(input.into());
        link.producer()?.close()?;

        self.process_stream(link.consumer()?)
    }

    /// Run the pipeline over a stream that may still be growing.
    pub fn process_stream(&self, input: Consumer) -> Result<(Consumer, PipelineHandle)> {
        let (tx, rx) = channel::unbounded();
        let mut handles = Vec::with_capacity(self.stages.len());
        let mut chain = input;

        for (index, stage) in self.stages.iter().enumerate() {
            let link = Channel::new();
            let output = link.producer()?;
            let next = link.consumer()?;

            let input = std::mem::replace(&mut chain, next);
            handles.push(self.spawn(index, Arc::clone(stage), input, output, link, tx.clone())?);
        }

        tracing::debug!(pipeline = %self.name, stages = handles.len(), "pipeline started");

        Ok((
            chain,
            PipelineHandle {
                stages: handles,
                reports: rx,
            },
        ))
    }

    fn spawn(
        &self,
        index: usize,
        stage: Stage,
        input: Consumer,
        output: Producer,
        link: Channel,
        reports: Sender<StageReport>,
    ) -> Result<JoinHandle<()>> {
        let name = format!("{}-{}", self.name, index);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(move || {
                tracing::debug!(stage = %name, "stage started");

                // the output producer is dropped while unwinding, which marks it failed
                let panicked =
                    panic::catch_unwind(AssertUnwindSafe(|| stage(input, output))).is_err();
                let status = link.status();

                if panicked {
                    tracing::warn!(stage = %name, %status, "stage panicked");
                } else {
                    tracing::debug!(stage = %name, %status, "stage finished");
                }

                // nobody may be listening anymore, that's fine
                reports
                    .send(StageReport {
                        index,
                        name,
                        status,
                        panicked,
                    })
                    .unwrap_or_default();
            })
            .map_err(|err| BufferError::Spawn {
                message: err.to_string(),
            })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// The running stages of one `Pipeline::process` call.
pub struct PipelineHandle {
    stages: Vec<JoinHandle<()>>,
    reports: Receiver<StageReport>,
}

impl PipelineHandle {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(JoinHandle::is_finished)
    }

    /// Reports of the stages that finished since the last call.
    pub fn reports(&self) -> Vec<StageReport> {
        self.reports.try_iter().collect()
    }

    /// Wait up to `timeout` for the next stage to finish.
    pub fn next_report(&self, timeout: Duration) -> Option<StageReport> {
        self.reports.recv_timeout(timeout).ok()
    }

    /// Join every stage thread, and return the reports not yet collected, ordered by stage.
    pub fn wait(self) -> Vec<StageReport> {
        for handle in self.stages {
            // stage panics are caught inside the thread
            handle.join().unwrap_or_default();
        }

        let mut reports: Vec<StageReport> = self.reports.try_iter().collect();
        reports.sort_by_key(|report| report.index);
        reports
    }
}

impl fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("stages", &self.stages.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}
