//! Threshold/hysteresis alarm with a maximum episode length
//!
//! `Idle → Alarm` when the ratio reaches the trigger threshold (optionally
//! held for `min_trigger_duration`). `Alarm → Idle` when the ratio falls to the
//! reset threshold, or when the episode has lasted `max_event_duration`.
//! A timed-out channel stays disarmed until the ratio drops to the reset
//! threshold so a sustained high ratio cannot re-trigger in a loop.

use crate::config::{seconds_to_delta, ChannelConfig};
use crate::engine::event::{ChannelId, Event, EventKind};
use chrono::{DateTime, Duration, Utc};

/// Current alarm mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlarmMode {
    #[default]
    Idle,
    Alarm,
}

/// Mutable alarm state of one channel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlarmState {
    pub mode: AlarmMode,
    /// Timestamp of the last Idle/Alarm transition
    pub last_transition: Option<DateTime<Utc>>,
    /// Sample index of the last Idle/Alarm transition
    pub last_transition_index: Option<u64>,
    /// Highest ratio of the current (or pending) episode
    pub peak_ratio: f64,
    /// False after a timeout until the ratio falls to the reset threshold
    pub disarmed: bool,
    /// First sample of the current run above the trigger threshold
    pub pending_since: Option<DateTime<Utc>>,
}

/// Alarm state machine for one channel
#[derive(Debug, Clone)]
pub struct AlarmStateMachine {
    channel_id: ChannelId,
    trigger_threshold: f64,
    reset_threshold: f64,
    max_event_duration: Duration,
    min_trigger_duration: Duration,
    state: AlarmState,
}

impl AlarmStateMachine {
    pub fn new(
        channel_id: ChannelId,
        trigger_threshold: f64,
        reset_threshold: f64,
        max_event_duration: f64,
    ) -> Self {
        Self {
            channel_id,
            trigger_threshold,
            reset_threshold,
            max_event_duration: seconds_to_delta(max_event_duration),
            min_trigger_duration: Duration::zero(),
            state: AlarmState::default(),
        }
    }

    /// Require the ratio to stay above the trigger threshold this long
    pub fn with_min_trigger_duration(mut self, seconds: f64) -> Self {
        self.min_trigger_duration = seconds_to_delta(seconds);
        self
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.channel_id.clone(),
            config.trigger_threshold,
            config.reset_threshold,
            config.max_event_duration,
        )
        .with_min_trigger_duration(config.min_trigger_duration)
    }

    /// Feed one ratio value
    ///
    /// # Arguments
    /// * `ratio` - STA/LTA ratio of the current sample
    /// * `timestamp` - Timestamp of the current sample
    /// * `sample_index` - Index of the current sample in the channel stream
    ///
    /// # Returns
    /// The event emitted by this sample, if any
    pub fn update(&mut self, ratio: f64, timestamp: DateTime<Utc>, sample_index: u64) -> Option<Event> {
        match self.state.mode {
            AlarmMode::Idle => self.update_idle(ratio, timestamp, sample_index),
            AlarmMode::Alarm => self.update_alarm(ratio, timestamp, sample_index),
        }
    }

    fn update_idle(&mut self, ratio: f64, timestamp: DateTime<Utc>, sample_index: u64) -> Option<Event> {
        if self.state.disarmed {
            if ratio <= self.reset_threshold {
                tracing::debug!(channel = %self.channel_id, ratio, "Alarm re-armed");
                self.state.disarmed = false;
            }
            return None;
        }

        if ratio.is_nan() || ratio < self.trigger_threshold {
            self.state.pending_since = None;
            self.state.peak_ratio = 0.0;
            return None;
        }

        let since = *self.state.pending_since.get_or_insert(timestamp);
        self.state.peak_ratio = self.state.peak_ratio.max(ratio);
        if timestamp - since < self.min_trigger_duration {
            return None;
        }

        self.state.mode = AlarmMode::Alarm;
        self.state.pending_since = None;
        Some(self.transition(EventKind::Triggered, ratio, timestamp, sample_index))
    }

    fn update_alarm(&mut self, ratio: f64, timestamp: DateTime<Utc>, sample_index: u64) -> Option<Event> {
        self.state.peak_ratio = self.state.peak_ratio.max(ratio);

        let kind = if ratio <= self.reset_threshold {
            EventKind::Reset
        } else if self.elapsed(timestamp) >= self.max_event_duration {
            self.state.disarmed = true;
            EventKind::TimeoutReset
        } else {
            return None;
        };

        self.state.mode = AlarmMode::Idle;
        let event = self.transition(kind, ratio, timestamp, sample_index);
        self.state.peak_ratio = 0.0;
        Some(event)
    }

    /// Close an open episode without a ratio, e.g. after a stream gap
    ///
    /// Emits a `Reset` with ratio 0 when the channel was alarmed and leaves
    /// the machine idle and armed either way.
    pub fn force_reset(&mut self, timestamp: DateTime<Utc>, sample_index: u64) -> Option<Event> {
        let event = if self.state.mode == AlarmMode::Alarm {
            self.state.mode = AlarmMode::Idle;
            Some(self.transition(EventKind::Reset, 0.0, timestamp, sample_index))
        } else {
            None
        };
        self.state.peak_ratio = 0.0;
        self.state.disarmed = false;
        self.state.pending_since = None;
        event
    }

    fn transition(&mut self, kind: EventKind, ratio: f64, timestamp: DateTime<Utc>, sample_index: u64) -> Event {
        self.state.last_transition = Some(timestamp);
        self.state.last_transition_index = Some(sample_index);

        tracing::info!(
            channel = %self.channel_id,
            kind = %kind,
            ratio,
            peak = self.state.peak_ratio,
            sample_index,
            "Alarm transition"
        );

        Event {
            channel_id: self.channel_id.clone(),
            timestamp,
            sample_index,
            ratio,
            peak_ratio: self.state.peak_ratio,
            kind,
        }
    }

    /// Time spent in the current alarm episode
    fn elapsed(&self, timestamp: DateTime<Utc>) -> Duration {
        match self.state.last_transition {
            Some(start) => timestamp - start,
            None => Duration::zero(),
        }
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    pub fn mode(&self) -> AlarmMode {
        self.state.mode
    }

    pub fn is_alarmed(&self) -> bool {
        self.state.mode == AlarmMode::Alarm
    }

    /// Return to the initial idle state
    pub fn reset(&mut self) {
        self.state = AlarmState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TRIGGER: f64 = 1.7;
    const RESET: f64 = 1.6;

    fn ts(index: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(10 * index as i64)
    }

    fn machine(max_event_duration: f64) -> AlarmStateMachine {
        AlarmStateMachine::new(ChannelId::from("EHZ"), TRIGGER, RESET, max_event_duration)
    }

    fn run(alarm: &mut AlarmStateMachine, ratios: &[f64]) -> Vec<Event> {
        ratios
            .iter()
            .enumerate()
            .filter_map(|(i, &r)| alarm.update(r, ts(i as u64), i as u64))
            .collect()
    }

    #[test]
    fn test_trigger_and_reset() {
        let mut alarm = machine(60.0);
        let events = run(&mut alarm, &[1.0, 1.8, 2.5, 1.9, 1.5, 1.0]);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Triggered);
        assert_eq!(events[0].sample_index, 1);
        assert_eq!(events[0].ratio, 1.8);
        assert_eq!(events[1].kind, EventKind::Reset);
        assert_eq!(events[1].sample_index, 4);
        assert_eq!(events[1].peak_ratio, 2.5);
        assert_eq!(alarm.mode(), AlarmMode::Idle);
    }

    #[test]
    fn test_nan_ratio_never_triggers() {
        let mut alarm = machine(60.0);
        assert!(run(&mut alarm, &[f64::NAN; 50]).is_empty());
        assert_eq!(alarm.mode(), AlarmMode::Idle);

        let mut alarm = machine(60.0);
        let events = run(&mut alarm, &[1.0, f64::NAN, 1.8, f64::NAN, 1.5]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Triggered);
        assert_eq!(events[0].sample_index, 2);
        assert_eq!(events[1].kind, EventKind::Reset);
        assert_eq!(events[1].sample_index, 4);
        assert_eq!(events[1].peak_ratio, 1.8);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let mut alarm = machine(60.0);
        let events = run(&mut alarm, &[TRIGGER, RESET]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Triggered);
        assert_eq!(events[1].kind, EventKind::Reset);
    }

    #[test]
    fn test_hysteresis_suppresses_chatter() {
        let mut alarm = machine(60.0);
        let ratios = [1.8, 1.65, 1.9, 1.61, 2.0, 1.69, 1.75, 1.6];
        let events = run(&mut alarm, &ratios);

        let triggers = events.iter().filter(|e| e.kind == EventKind::Triggered).count();
        assert_eq!(triggers, 1);
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Reset));
        assert_eq!(events.last().map(|e| e.sample_index), Some(7));
    }

    #[test]
    fn test_timeout_fires_exactly_at_boundary() {
        // 1 s at 100 Hz is 100 samples after the trigger
        let mut alarm = machine(1.0);
        let ratios = vec![2.0; 300];
        let events = run(&mut alarm, &ratios);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Triggered);
        assert_eq!(events[0].sample_index, 0);
        assert_eq!(events[1].kind, EventKind::TimeoutReset);
        assert_eq!(events[1].sample_index, 100);
        assert_eq!(events[1].timestamp - events[0].timestamp, Duration::seconds(1));
    }

    #[test]
    fn test_no_retrigger_until_reset_threshold_after_timeout() {
        let mut alarm = machine(1.0);
        let mut ratios = vec![2.0; 200];
        ratios.push(1.65);
        ratios.push(1.5);
        ratios.push(1.8);
        let events = run(&mut alarm, &ratios);

        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Triggered, EventKind::TimeoutReset, EventKind::Triggered]
        );
        assert_eq!(events[2].sample_index, 202);
    }

    #[test]
    fn test_reset_wins_over_timeout_on_same_sample() {
        let mut alarm = machine(1.0);
        let mut ratios = vec![2.0; 100];
        ratios.push(1.0);
        let events = run(&mut alarm, &ratios);

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Reset);
        assert_eq!(events[1].sample_index, 100);
        assert!(!alarm.state().disarmed);
    }

    #[test]
    fn test_min_trigger_duration_holds_trigger() {
        let mut alarm = machine(60.0).with_min_trigger_duration(0.05);
        // Short excursion is ignored
        let mut ratios = vec![2.0, 2.0, 1.0];
        // Sustained excursion triggers 5 samples (50 ms) after it starts
        ratios.extend(std::iter::repeat(2.0).take(10));
        let events = run(&mut alarm, &ratios);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Triggered);
        assert_eq!(events[0].sample_index, 8);
    }

    #[test]
    fn test_force_reset_closes_episode() {
        let mut alarm = machine(60.0);
        run(&mut alarm, &[2.0, 2.2]);
        assert!(alarm.is_alarmed());

        let event = alarm.force_reset(ts(50), 50).unwrap();
        assert_eq!(event.kind, EventKind::Reset);
        assert_eq!(event.ratio, 0.0);
        assert_eq!(event.peak_ratio, 2.2);
        assert!(!alarm.is_alarmed());

        assert!(alarm.force_reset(ts(51), 51).is_none());
    }

    #[test]
    fn test_records_last_transition() {
        let mut alarm = machine(60.0);
        run(&mut alarm, &[1.0, 1.0, 1.9]);
        assert_eq!(alarm.state().last_transition, Some(ts(2)));
        assert_eq!(alarm.state().last_transition_index, Some(2));

        alarm.reset();
        assert_eq!(alarm.state(), &AlarmState::default());
    }
}
