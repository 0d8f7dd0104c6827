use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{sleep, sleep_until, Instant},
};
use tracing::{debug, info};

use crate::{channel_map::DRUM_ENGINE_CHANNEL, engine::AudioEngine};

pub const MIN_BPM: u16 = 40;
pub const MAX_BPM: u16 = 240;
pub const BPM_STEP: i16 = 5;
pub const MAX_VOLUME: u8 = 127;
pub const VOLUME_STEP: i16 = 5;

pub const CLICK_NOTE: u8 = 76;
pub const CLICK_VELOCITY: u8 = 110;
pub const GATE: Duration = Duration::from_millis(50);
pub const DISABLED_POLL: Duration = Duration::from_millis(200);

pub type ConfigSender = watch::Sender<MetronomeConfig>;
pub type ConfigReceiver = watch::Receiver<MetronomeConfig>;

pub fn create_config_channel(config: MetronomeConfig) -> (ConfigSender, ConfigReceiver) {
    watch::channel(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub bpm: u16,
    pub volume: u8,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bpm: 120,
            volume: 80,
        }
    }
}

impl MetronomeConfig {
    pub fn adjust_bpm(&mut self, delta: i16) -> u16 {
        self.bpm = (self.bpm as i16 + delta).clamp(MIN_BPM as i16, MAX_BPM as i16) as u16;
        self.bpm
    }

    pub fn adjust_volume(&mut self, delta: i16) -> u8 {
        self.volume = (self.volume as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
        self.volume
    }
}

/// Time between two clicks.
pub fn beat_period(bpm: u16) -> Duration {
    Duration::from_secs_f64(60.0 / bpm.max(1) as f64)
}

/// Click times anchored to a fixed origin (`anchor + n * period`) so sleep
/// overshoot never accumulates. A tempo change re-anchors on the last click.
#[derive(Debug, Clone)]
pub struct Schedule {
    anchor: Instant,
    beats: u32,
    bpm: u16,
}

impl Schedule {
    pub fn new(start: Instant, bpm: u16) -> Self {
        Self {
            anchor: start,
            beats: 0,
            bpm,
        }
    }

    pub fn next_trigger(&self) -> Instant {
        self.anchor + beat_period(self.bpm) * self.beats
    }

    pub fn advance(&mut self) {
        self.beats += 1;
    }

    pub fn set_bpm(&mut self, bpm: u16) {
        if bpm == self.bpm {
            return;
        }
        if self.beats > 0 {
            self.anchor += beat_period(self.bpm) * (self.beats - 1);
            self.beats = 1;
        }
        self.bpm = bpm;
    }

    /// Drops clicks that are already more than a period late.
    pub fn catch_up(&mut self, now: Instant) {
        if self.next_trigger() + beat_period(self.bpm) < now {
            self.anchor = now;
            self.beats = 0;
        }
    }
}

/// Background click generator. It only ever talks to the audio engine.
pub struct Metronome {
    engine: Arc<dyn AudioEngine>,
    config: ConfigReceiver,
}

impl Metronome {
    pub fn new(engine: Arc<dyn AudioEngine>, config: ConfigReceiver) -> Self {
        Self { engine, config }
    }

    pub async fn run(mut self) {
        info!("Metronome started");
        loop {
            let config = *self.config.borrow_and_update();
            let open = if config.enabled {
                self.run_enabled(config.bpm).await
            } else {
                tokio::select! {
                    changed = self.config.changed() => changed.is_ok(),
                    _ = sleep(DISABLED_POLL) => true,
                }
            };
            if !open {
                break;
            }
        }
        info!("Metronome stopped");
    }

    /// Clicks until disabled. Config changes interrupt the wait for the next
    /// click. Returns `false` once the config sender is gone.
    async fn run_enabled(&mut self, bpm: u16) -> bool {
        let mut schedule = Schedule::new(Instant::now(), bpm);
        loop {
            let config = *self.config.borrow_and_update();
            if !config.enabled {
                return true;
            }
            schedule.set_bpm(config.bpm);
            schedule.catch_up(Instant::now());
            tokio::select! {
                _ = sleep_until(schedule.next_trigger()) => {
                    self.click().await;
                    schedule.advance();
                }
                changed = self.config.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    async fn click(&self) {
        if let Err(e) = self
            .engine
            .note_on(DRUM_ENGINE_CHANNEL, CLICK_NOTE, CLICK_VELOCITY)
        {
            debug!("Metronome click failed: {e}");
            return;
        }
        sleep(GATE).await;
        // A user-played note on the drum channel may already have released it.
        if let Err(e) = self.engine.note_off(DRUM_ENGINE_CHANNEL, CLICK_NOTE) {
            debug!("Metronome release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, RecordingEngine};

    #[test]
    fn bpm_and_volume_stay_in_range() {
        let mut config = MetronomeConfig::default();
        for _ in 0..100 {
            config.adjust_bpm(BPM_STEP);
            config.adjust_volume(VOLUME_STEP);
        }
        assert_eq!(config.bpm, MAX_BPM);
        assert_eq!(config.volume, MAX_VOLUME);
        for _ in 0..100 {
            config.adjust_bpm(-BPM_STEP);
            config.adjust_volume(-VOLUME_STEP);
        }
        assert_eq!(config.bpm, MIN_BPM);
        assert_eq!(config.volume, 0);
    }

    #[test]
    fn period_follows_bpm() {
        assert_eq!(beat_period(120), Duration::from_millis(500));
        assert_eq!(beat_period(60), Duration::from_secs(1));
        assert_eq!(beat_period(240), Duration::from_millis(250));
        assert_eq!(beat_period(40), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_does_not_drift() {
        let start = Instant::now();
        let mut schedule = Schedule::new(start, 120);
        for _ in 0..1000 {
            schedule.advance();
        }
        assert_eq!(schedule.next_trigger() - start, Duration::from_secs(500));
    }

    #[tokio::test(start_paused = true)]
    async fn tempo_change_reanchors_on_last_click() {
        let start = Instant::now();
        let mut schedule = Schedule::new(start, 120);
        schedule.advance();
        schedule.advance();
        // last click at 0.5 s
        schedule.set_bpm(60);
        assert_eq!(schedule.next_trigger() - start, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_on_the_drum_channel() {
        let engine = Arc::new(RecordingEngine::default());
        let (tx, rx) = create_config_channel(MetronomeConfig {
            enabled: true,
            bpm: 120,
            volume: 80,
        });
        let handle = tokio::spawn(Metronome::new(engine.clone(), rx).run());

        sleep(Duration::from_millis(1990)).await;
        let calls = engine.calls();
        let on = EngineCall::NoteOn {
            channel: DRUM_ENGINE_CHANNEL,
            note: CLICK_NOTE,
            velocity: CLICK_VELOCITY,
        };
        let off = EngineCall::NoteOff {
            channel: DRUM_ENGINE_CHANNEL,
            note: CLICK_NOTE,
        };
        assert_eq!(calls.iter().filter(|c| **c == on).count(), 4);
        assert_eq!(calls.iter().filter(|c| **c == off).count(), 4);

        tx.send_modify(|c| c.enabled = false);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.calls().iter().filter(|c| **c == on).count(), 4);

        drop(tx);
        handle.await.unwrap();
    }

    fn clicks(engine: &RecordingEngine) -> usize {
        engine
            .calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::NoteOn { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_cancels_the_pending_click() {
        let engine = Arc::new(RecordingEngine::default());
        let (tx, rx) = create_config_channel(MetronomeConfig {
            enabled: true,
            bpm: MIN_BPM,
            volume: 80,
        });
        let handle = tokio::spawn(Metronome::new(engine.clone(), rx).run());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(clicks(&engine), 1);
        tx.send_modify(|c| c.enabled = false);
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(clicks(&engine), 1);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tempo_change_applies_before_the_next_click() {
        let engine = Arc::new(RecordingEngine::default());
        let (tx, rx) = create_config_channel(MetronomeConfig {
            enabled: true,
            bpm: MIN_BPM,
            volume: 80,
        });
        let handle = tokio::spawn(Metronome::new(engine.clone(), rx).run());

        sleep(Duration::from_millis(100)).await;
        tx.send_modify(|c| c.bpm = MAX_BPM);
        // re-anchored on the click at 0 s, the next one is due at 250 ms
        sleep(Duration::from_millis(200)).await;
        assert_eq!(clicks(&engine), 2);

        drop(tx);
        handle.await.unwrap();
    }
}
