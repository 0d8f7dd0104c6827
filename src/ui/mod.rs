use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{info, warn};

pub mod display;
pub mod frame;

pub use display::{Display, DisplayError, LogDisplay, NullDisplay};
pub use frame::Frame;

use crate::{menu::Mode, power, power::VoltageSource, state::Shared};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(20);
pub const ECO_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(150);
const NO_BATTERY: &str = "--:--";

pub fn min_frame_interval(low_power: bool) -> Duration {
    if low_power {
        ECO_MIN_FRAME_INTERVAL
    } else {
        MIN_FRAME_INTERVAL
    }
}

/// Redraws the whole screen on a fixed cadence, or sooner when a redraw is
/// requested, but never faster than the minimum interval.
pub struct RenderLoop {
    shared: Arc<Shared>,
    display: Box<dyn Display>,
    voltage: Option<Box<dyn VoltageSource>>,
}

impl RenderLoop {
    pub fn new(
        shared: Arc<Shared>,
        display: Box<dyn Display>,
        voltage: Option<Box<dyn VoltageSource>>,
    ) -> Self {
        Self {
            shared,
            display,
            voltage,
        }
    }

    pub fn present(&mut self, frame: &Frame) {
        if let Err(e) = self.display.present_frame(frame) {
            warn!("{e}");
        }
    }

    /// Returns after the final frame once shutdown has begun.
    pub async fn run(mut self) {
        info!("Render loop started");
        loop {
            let started = Instant::now();
            let snapshot = {
                let mut state = self.shared.lock().await;
                let now = std::time::Instant::now();
                state.overlays.expire(now);
                state.snapshot(now)
            };

            if snapshot.mode == Mode::Shutdown {
                self.present(&frame::halt_frame());
                break;
            }

            let time_left = match self.voltage.as_mut() {
                Some(source) => power::time_left(source.voltage_smoothed(), snapshot.low_power),
                None => NO_BATTERY.to_owned(),
            };
            self.present(&frame::build(&snapshot, &time_left));

            tokio::select! {
                _ = sleep(FRAME_INTERVAL) => {}
                _ = self.shared.redraw_requested() => {}
            }
            sleep_until(started + min_frame_interval(snapshot.low_power)).await;
        }
        info!("Render loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mixer::MixerSettings, state::State};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CaptureDisplay {
        frames: Arc<Mutex<Vec<Frame>>>,
        fail_first: Arc<Mutex<usize>>,
    }

    impl Display for CaptureDisplay {
        fn present_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
            let mut fail = self.fail_first.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(DisplayError::Transfer("bus busy".into()));
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renders_until_shutdown() {
        let shared = Shared::new(State::new(MixerSettings::default()));
        let display = CaptureDisplay::default();
        *display.fail_first.lock().unwrap() = 2;
        let handle = tokio::spawn(
            RenderLoop::new(Arc::clone(&shared), Box::new(display.clone()), None).run(),
        );

        sleep(Duration::from_millis(500)).await;
        let count = display.frames.lock().unwrap().len();
        // failed frames are skipped, rendering carries on
        assert!(count >= 5, "{count}");
        assert_eq!(
            display.frames.lock().unwrap()[0].texts()[0],
            format!("TIME: {NO_BATTERY}")
        );

        shared.lock().await.menu.enter(Mode::Shutdown, vec![]);
        handle.await.unwrap();
        let frames = display.frames.lock().unwrap();
        assert_eq!(frames.last(), Some(&frame::halt_frame()));
    }

    #[tokio::test(start_paused = true)]
    async fn low_power_slows_the_cadence() {
        let mut state = State::new(MixerSettings::default());
        state.low_power = true;
        let shared = Shared::new(state);
        let display = CaptureDisplay::default();
        tokio::spawn(RenderLoop::new(Arc::clone(&shared), Box::new(display.clone()), None).run());

        sleep(Duration::from_millis(1000)).await;
        let count = display.frames.lock().unwrap().len();
        assert!((6..=8).contains(&count), "{count}");
    }
}
