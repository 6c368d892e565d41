//! Inline routing of samples to channel pipelines
//!
//! The orchestrator owns one [`ChannelPipeline`] per registered channel and
//! forwards every event to the [`EventSink`]. Channels never share state;
//! registering or deregistering one leaves the others untouched.

use crate::config::{ChannelConfig, EngineConfig};
use crate::diagnostics::DiagnosticRecord;
use crate::engine::channel::ChannelPipeline;
use crate::engine::event::{ChannelId, Event};
use crate::engine::sink::{EventReceiver, EventSink, SinkStats};
use crate::engine::EngineError;
use crate::stats::store::RunningStats;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Sequential multi-channel router
#[derive(Debug)]
pub struct ChannelOrchestrator {
    channels: HashMap<ChannelId, ChannelPipeline>,
    sink: EventSink,
}

impl ChannelOrchestrator {
    /// Create an orchestrator with no channels
    pub fn new(sink: EventSink) -> Self {
        Self {
            channels: HashMap::new(),
            sink,
        }
    }

    /// Build the sink and register every channel of an engine config
    ///
    /// # Returns
    /// The orchestrator and the receiving end of its event queue
    pub fn from_config(config: &EngineConfig) -> Result<(Self, EventReceiver), EngineError> {
        config.validate()?;
        let (sink, receiver) = EventSink::bounded(&config.sink);
        let mut orchestrator = Self::new(sink);
        for channel in &config.channels {
            orchestrator.register(channel.clone())?;
        }
        Ok((orchestrator, receiver))
    }

    /// Validate a channel config and create its state
    pub fn register(&mut self, config: ChannelConfig) -> Result<(), EngineError> {
        if self.channels.contains_key(&config.channel_id) {
            return Err(EngineError::DuplicateChannel(config.channel_id.to_string()));
        }

        let pipeline = ChannelPipeline::new(config)?;
        let id = pipeline.channel_id().clone();
        tracing::info!(
            channel = %id,
            sample_rate = pipeline.config().sample_rate,
            lowcut = pipeline.config().lowcut,
            highcut = pipeline.config().highcut,
            "Channel registered"
        );
        self.channels.insert(id, pipeline);
        Ok(())
    }

    /// Discard a channel's state
    ///
    /// # Returns
    /// The channel's final statistics
    pub fn deregister(&mut self, channel_id: &str) -> Result<RunningStats, EngineError> {
        let pipeline = self
            .channels
            .remove(channel_id)
            .ok_or_else(|| EngineError::UnknownChannel(channel_id.to_string()))?;
        tracing::info!(
            channel = %channel_id,
            samples = pipeline.samples_processed(),
            "Channel deregistered"
        );
        Ok(pipeline.stats().clone())
    }

    /// Route one sample and forward any event to the sink
    ///
    /// # Arguments
    /// * `channel_id` - Registered channel
    /// * `timestamp` - Sample time, increasing per channel
    /// * `raw` - Raw amplitude
    pub fn push(
        &mut self,
        channel_id: &str,
        timestamp: DateTime<Utc>,
        raw: f64,
    ) -> Result<Option<Event>, EngineError> {
        let event = self.pipeline_mut(channel_id)?.process(timestamp, raw)?;
        self.forward(event.as_ref());
        Ok(event)
    }

    /// Like [`push`](Self::push) but also returns the sample's trace row
    pub fn push_traced(
        &mut self,
        channel_id: &str,
        timestamp: DateTime<Utc>,
        raw: f64,
    ) -> Result<(DiagnosticRecord, Option<Event>), EngineError> {
        let (record, event) = self.pipeline_mut(channel_id)?.process_traced(timestamp, raw)?;
        self.forward(event.as_ref());
        Ok((record, event))
    }

    /// Route a block of consecutive samples of one channel
    ///
    /// `start` is the first sample's timestamp; the rest follow at the
    /// channel's nominal sample interval. Non-finite and overflowing samples
    /// are skipped and counted.
    pub fn push_block(
        &mut self,
        channel_id: &str,
        start: DateTime<Utc>,
        samples: &[f64],
    ) -> Result<Vec<Event>, EngineError> {
        let pipeline = self.pipeline_mut(channel_id)?;
        let interval = pipeline.config().sample_interval();

        let mut events = Vec::new();
        let mut timestamp = start;
        for &raw in samples {
            match pipeline.process(timestamp, raw) {
                Ok(Some(event)) => events.push(event),
                Ok(None)
                | Err(EngineError::NonFiniteSample { .. } | EngineError::SampleOverflow { .. }) => {}
                Err(e) => return Err(e),
            }
            timestamp += interval;
        }

        for event in &events {
            self.forward(Some(event));
        }
        Ok(events)
    }

    fn pipeline_mut(&mut self, channel_id: &str) -> Result<&mut ChannelPipeline, EngineError> {
        self.channels
            .get_mut(channel_id)
            .ok_or_else(|| EngineError::UnknownChannel(channel_id.to_string()))
    }

    fn forward(&self, event: Option<&Event>) {
        if let Some(event) = event {
            // Failures are counted and logged by the sink
            let _ = self.sink.deliver(event.clone());
        }
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelPipeline> {
        self.channels.get(channel_id)
    }

    pub fn stats(&self, channel_id: &str) -> Option<&RunningStats> {
        self.channels.get(channel_id).map(|p| p.stats())
    }

    /// Most recent events of a channel, oldest first
    pub fn recent_events(&self, channel_id: &str) -> Option<Vec<Event>> {
        self.channels
            .get(channel_id)
            .map(|p| p.store().recent_events().iter().cloned().collect())
    }

    pub fn sink_stats(&self) -> SinkStats {
        self.sink.stats()
    }

    /// Registered channel ids, sorted
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use crate::engine::event::EventKind;
    use chrono::{Duration, TimeZone};

    fn orchestrator() -> (ChannelOrchestrator, EventReceiver) {
        let (sink, receiver) = EventSink::bounded(&SinkConfig::default());
        (ChannelOrchestrator::new(sink), receiver)
    }

    fn channel(id: &str) -> ChannelConfig {
        ChannelConfig::new(id, 100.0)
            .with_band(1.0, 10.0)
            .with_filter_order(4)
            .with_windows(0.5, 5.0)
            .with_thresholds(4.5, 1.5)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 25, 9, 0, 0).unwrap()
    }

    fn burst_signal() -> Vec<f64> {
        (0..3000)
            .map(|i| {
                let noise = ((i as f64 * 78.233).sin() * 43758.5453).fract() - 0.5;
                if (1000..1200).contains(&i) {
                    noise + 40.0 * (i as f64 * 0.6).sin()
                } else {
                    noise
                }
            })
            .collect()
    }

    #[test]
    fn test_register_and_deregister() {
        let (mut orch, _rx) = orchestrator();
        orch.register(channel("EHZ")).unwrap();
        orch.register(channel("EHN")).unwrap();
        assert_eq!(orch.len(), 2);
        assert_eq!(
            orch.channel_ids(),
            vec![ChannelId::from("EHN"), ChannelId::from("EHZ")]
        );

        let stats = orch.deregister("EHZ").unwrap();
        assert_eq!(stats.samples_processed, 0);
        assert!(!orch.contains("EHZ"));
        assert!(orch.contains("EHN"));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let (mut orch, _rx) = orchestrator();
        orch.register(channel("EHZ")).unwrap();
        assert!(matches!(
            orch.register(channel("EHZ")),
            Err(EngineError::DuplicateChannel(id)) if id == "EHZ"
        ));
        assert_eq!(orch.len(), 1);
    }

    #[test]
    fn test_invalid_channel_creates_no_state() {
        let (mut orch, _rx) = orchestrator();
        let result = orch.register(channel("EHZ").with_windows(10.0, 5.0));
        assert!(matches!(result, Err(EngineError::InvalidConfig { .. })));
        assert!(orch.is_empty());
        assert!(orch.stats("EHZ").is_none());
    }

    #[test]
    fn test_unknown_channel() {
        let (mut orch, _rx) = orchestrator();
        assert!(matches!(
            orch.push("XYZ", start(), 1.0),
            Err(EngineError::UnknownChannel(_))
        ));
        assert!(matches!(
            orch.deregister("XYZ"),
            Err(EngineError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_events_reach_sink() {
        let (mut orch, rx) = orchestrator();
        orch.register(channel("EHZ")).unwrap();

        let returned = orch.push_block("EHZ", start(), &burst_signal()).unwrap();
        let received = rx.drain();

        assert_eq!(returned, received);
        let kinds: Vec<EventKind> = received.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Triggered, EventKind::Reset]);
        assert_eq!(orch.sink_stats().delivered, 2);
        assert_eq!(orch.recent_events("EHZ").map(|e| e.len()), Some(2));
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut orch, _rx) = orchestrator();
        orch.register(channel("EHZ")).unwrap();
        orch.register(channel("EHN")).unwrap();

        let loud = burst_signal();
        let quiet: Vec<f64> = loud
            .iter()
            .enumerate()
            .map(|(i, &x)| if (1000..1200).contains(&i) { 0.0 } else { x })
            .collect();

        for (i, (&a, &b)) in loud.iter().zip(&quiet).enumerate() {
            let t = start() + Duration::milliseconds(10 * i as i64);
            orch.push("EHZ", t, a).unwrap();
            orch.push("EHN", t, b).unwrap();
        }

        assert_eq!(orch.stats("EHZ").map(|s| s.triggers), Some(1));
        assert_eq!(orch.stats("EHN").map(|s| s.triggers), Some(0));
    }

    #[test]
    fn test_push_block_skips_non_finite() {
        let (mut orch, _rx) = orchestrator();
        orch.register(channel("EHZ")).unwrap();

        let samples = [0.1, f64::NAN, 0.2, f64::NEG_INFINITY, 0.3];
        orch.push_block("EHZ", start(), &samples).unwrap();

        let stats = orch.stats("EHZ").unwrap();
        assert_eq!(stats.samples_processed, 3);
        assert_eq!(stats.samples_rejected, 2);
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            channels: vec![channel("EHZ"), channel("ENE")],
            sink: SinkConfig::default(),
        };
        let (orch, _rx) = ChannelOrchestrator::from_config(&config).unwrap();
        assert_eq!(orch.len(), 2);

        let duplicate = EngineConfig {
            channels: vec![channel("EHZ"), channel("EHZ")],
            sink: SinkConfig::default(),
        };
        assert!(matches!(
            ChannelOrchestrator::from_config(&duplicate),
            Err(EngineError::Config(_))
        ));
    }
}
