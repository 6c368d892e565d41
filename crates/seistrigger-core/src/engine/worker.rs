//! One thread per channel
//!
//! Each [`ChannelWorker`] owns its [`ChannelPipeline`] on a named thread and
//! is fed through a bounded sample queue. Workers share nothing but a clone
//! of the [`EventSink`]. Stopping a worker closes its queue; the thread drains
//! what is left and hands the pipeline back.

use crate::config::{ChannelConfig, EngineConfig};
use crate::engine::channel::ChannelPipeline;
use crate::engine::event::ChannelId;
use crate::engine::sink::{EventReceiver, EventSink, SinkStats};
use crate::engine::EngineError;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::thread::JoinHandle;

/// Default number of samples buffered per channel (10 s at 100 Hz)
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

type SampleMsg = (DateTime<Utc>, f64);

/// Handle to a channel's processing thread
#[derive(Debug)]
pub struct ChannelWorker {
    channel_id: ChannelId,
    tx: Option<Sender<SampleMsg>>,
    thread: Option<JoinHandle<ChannelPipeline>>,
}

impl ChannelWorker {
    /// Spawn the processing thread for a pipeline
    pub fn spawn(
        pipeline: ChannelPipeline,
        sink: EventSink,
        queue_capacity: usize,
    ) -> Result<Self, EngineError> {
        let channel_id = pipeline.channel_id().clone();
        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(1));

        let thread = std::thread::Builder::new()
            .name(format!("channel-{}", channel_id))
            .spawn(move || run_worker(pipeline, rx, sink))
            .map_err(|source| EngineError::WorkerSpawn {
                channel: channel_id.to_string(),
                source,
            })?;

        Ok(Self {
            channel_id,
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue one sample, blocking while the queue is full
    pub fn push(&self, timestamp: DateTime<Utc>, raw: f64) -> Result<(), EngineError> {
        let stopped = || EngineError::WorkerStopped(self.channel_id.to_string());
        let tx = self.tx.as_ref().ok_or_else(stopped)?;
        tx.send((timestamp, raw)).map_err(|_| stopped())
    }

    /// Close the queue, wait for the thread to drain it and return the pipeline
    pub fn stop(mut self) -> Result<ChannelPipeline, EngineError> {
        self.tx.take();
        let handle = self
            .thread
            .take()
            .ok_or_else(|| EngineError::WorkerStopped(self.channel_id.to_string()))?;
        handle.join().map_err(|panic_info| {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::error!(channel = %self.channel_id, panic = %msg, "Channel worker PANICKED");
            EngineError::WorkerStopped(self.channel_id.to_string())
        })
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Check if the worker thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Samples waiting in the queue
    pub fn backlog(&self) -> usize {
        self.tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }
}

impl Drop for ChannelWorker {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(mut pipeline: ChannelPipeline, rx: Receiver<SampleMsg>, sink: EventSink) -> ChannelPipeline {
    tracing::debug!(channel = %pipeline.channel_id(), "Channel worker running");

    for (timestamp, raw) in rx.iter() {
        // Rejected samples are counted by the pipeline
        if let Ok(Some(event)) = pipeline.process(timestamp, raw) {
            let _ = sink.deliver(event);
        }
    }

    tracing::debug!(
        channel = %pipeline.channel_id(),
        samples = pipeline.samples_processed(),
        "Channel worker exited"
    );
    pipeline
}

/// Thread-per-channel router
#[derive(Debug)]
pub struct WorkerPool {
    workers: HashMap<ChannelId, ChannelWorker>,
    sink: EventSink,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(sink: EventSink) -> Self {
        Self::with_queue_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(sink: EventSink, queue_capacity: usize) -> Self {
        Self {
            workers: HashMap::new(),
            sink,
            queue_capacity,
        }
    }

    /// Build the sink and start a worker for every channel of an engine config
    pub fn from_config(config: &EngineConfig) -> Result<(Self, EventReceiver), EngineError> {
        config.validate()?;
        let (sink, receiver) = EventSink::bounded(&config.sink);
        let mut pool = Self::new(sink);
        for channel in &config.channels {
            pool.register(channel.clone())?;
        }
        Ok((pool, receiver))
    }

    /// Validate a channel config and start its worker
    pub fn register(&mut self, config: ChannelConfig) -> Result<(), EngineError> {
        if self.workers.contains_key(&config.channel_id) {
            return Err(EngineError::DuplicateChannel(config.channel_id.to_string()));
        }

        let pipeline = ChannelPipeline::new(config)?;
        let worker = ChannelWorker::spawn(pipeline, self.sink.clone(), self.queue_capacity)?;
        tracing::info!(channel = %worker.channel_id(), "Channel worker started");
        self.workers.insert(worker.channel_id().clone(), worker);
        Ok(())
    }

    /// Queue one sample for its channel's worker
    pub fn push(&self, channel_id: &str, timestamp: DateTime<Utc>, raw: f64) -> Result<(), EngineError> {
        self.workers
            .get(channel_id)
            .ok_or_else(|| EngineError::UnknownChannel(channel_id.to_string()))?
            .push(timestamp, raw)
    }

    /// Stop a channel's worker after it drained its queue
    ///
    /// # Returns
    /// The channel's pipeline with its final state and statistics
    pub fn deregister(&mut self, channel_id: &str) -> Result<ChannelPipeline, EngineError> {
        let worker = self
            .workers
            .remove(channel_id)
            .ok_or_else(|| EngineError::UnknownChannel(channel_id.to_string()))?;
        let pipeline = worker.stop()?;
        tracing::info!(
            channel = %channel_id,
            samples = pipeline.samples_processed(),
            "Channel worker stopped"
        );
        Ok(pipeline)
    }

    /// Stop every worker, returning pipelines sorted by channel id
    pub fn shutdown(mut self) -> Result<Vec<ChannelPipeline>, EngineError> {
        let mut ids: Vec<ChannelId> = self.workers.keys().cloned().collect();
        ids.sort();
        ids.iter().map(|id| self.deregister(id.as_str())).collect()
    }

    pub fn sink_stats(&self) -> SinkStats {
        self.sink.stats()
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.workers.contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
