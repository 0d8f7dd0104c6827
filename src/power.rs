use std::{
    collections::VecDeque,
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::engine::AudioEngine;

pub const MEDIAN_WINDOW: usize = 20;
pub const EMPTY_VOLTS: f32 = 3.4;
pub const FULL_VOLTS: f32 = 4.15;
pub const ECO_RUNTIME_MIN: f32 = 450.0;
pub const MAX_RUNTIME_MIN: f32 = 240.0;

/// Time the panel keeps showing the halt screen before power-off.
pub const SHUTDOWN_SETTLE: Duration = Duration::from_secs(1);

const GOVERNOR_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor";
const LED_PATH: &str = "/sys/class/leds/ACT";

pub trait VoltageSource: Send {
    /// Battery voltage with sampling noise filtered out; 0.0 when unreadable.
    fn voltage_smoothed(&mut self) -> f32;
}

/// Battery voltage exposed by a power-supply driver as micro-volts in a file
/// (e.g. `/sys/class/power_supply/*/voltage_now`).
pub struct SysfsVoltage {
    path: PathBuf,
    readings: VecDeque<f32>,
}

impl SysfsVoltage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            readings: VecDeque::with_capacity(MEDIAN_WINDOW + 1),
        }
    }

    fn read_volts(path: &Path) -> Option<f32> {
        let text = fs::read_to_string(path).ok()?;
        let micro_volts: f64 = text.trim().parse().ok()?;
        Some((micro_volts / 1_000_000.0) as f32)
    }
}

impl VoltageSource for SysfsVoltage {
    fn voltage_smoothed(&mut self) -> f32 {
        match Self::read_volts(&self.path) {
            Some(v) => {
                self.readings.push_back(v);
                if self.readings.len() > MEDIAN_WINDOW {
                    self.readings.pop_front();
                }
                median(&self.readings)
            }
            None => {
                debug!("Cannot read battery voltage from {:?}", self.path);
                0.0
            }
        }
    }
}

/// Upper median of the samples.
pub fn median(samples: &VecDeque<f32>) -> f32 {
    let mut sorted: Vec<f32> = samples.iter().copied().collect();
    sorted.sort_by(f32::total_cmp);
    sorted.get(sorted.len() / 2).copied().unwrap_or(0.0)
}

/// Estimated runtime left as `H:MM`.
pub fn time_left(volts: f32, low_power: bool) -> String {
    let charge = ((volts - EMPTY_VOLTS) / (FULL_VOLTS - EMPTY_VOLTS)).clamp(0.0, 1.0);
    let runtime = if low_power {
        ECO_RUNTIME_MIN
    } else {
        MAX_RUNTIME_MIN
    };
    let minutes = (charge * runtime) as u32;
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

/// Host power controls. With `dry_run` every action is only logged.
pub struct SystemPower {
    dry_run: bool,
}

impl SystemPower {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Display output, Wi-Fi, CPU governor and activity LED.
    pub async fn set_low_power(&self, on: bool) {
        info!("Low power mode: {on}");
        if on {
            self.run("tvservice", &["-o"]).await;
            self.run("rfkill", &["block", "wifi"]).await;
            self.write_sysfs(GOVERNOR_PATH, "powersave").await;
            self.write_sysfs(&format!("{LED_PATH}/trigger"), "none").await;
            self.write_sysfs(&format!("{LED_PATH}/brightness"), "0").await;
        } else {
            self.run("tvservice", &["-p"]).await;
            self.run("rfkill", &["unblock", "wifi"]).await;
            self.write_sysfs(GOVERNOR_PATH, "ondemand").await;
            self.write_sysfs(&format!("{LED_PATH}/trigger"), "mmc0").await;
            self.write_sysfs(&format!("{LED_PATH}/brightness"), "1").await;
        }
    }

    pub async fn power_off(&self) {
        info!("Powering off");
        self.run("/sbin/poweroff", &[]).await;
    }

    async fn run(&self, program: &str, args: &[&str]) {
        if self.dry_run {
            info!("[dry-run] sudo {program} {}", args.join(" "));
            return;
        }
        match Command::new("sudo").arg(program).args(args).output().await {
            Ok(output) if output.status.success() => debug!("{program} {args:?}: ok"),
            Ok(output) => warn!("{program} {args:?} exited with {}", output.status),
            Err(e) => warn!("Failed to run {program}: {e}"),
        }
    }

    async fn write_sysfs(&self, path: &str, value: &str) {
        if self.dry_run {
            info!("[dry-run] echo {value} > {path}");
            return;
        }
        if let Err(e) = tokio::fs::write(path, value).await {
            warn!("Failed to write {path}: {e}");
        }
    }
}

/// Releases the engine, then, when a power-off is given, lets the halt
/// screen settle and runs it.
pub async fn shut_down<F>(engine: &dyn AudioEngine, power_off: Option<F>)
where
    F: Future<Output = ()>,
{
    if let Err(e) = engine.release() {
        warn!("{e}");
    }
    if let Some(power_off) = power_off {
        tokio::time::sleep(SHUTDOWN_SETTLE).await;
        power_off.await;
    }
}
