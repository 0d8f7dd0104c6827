use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

use crate::engine::output::OutputParams;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    /// Log screen text whenever it changes
    Log,
    None,
}

#[derive(Parser, Debug)]
#[command(about = "Menu-driven SoundFont instrument for a small button panel.")]
pub struct Args {
    #[arg(long, default_value = "/home/pi", help = "Base directory for media and settings")]
    base_dir: PathBuf,

    #[arg(long, help = "SoundFont directory [default: <base-dir>/sf2]")]
    soundfonts: Option<PathBuf>,

    #[arg(long, help = "MIDI file directory [default: <base-dir>/midifiles]")]
    midi_files: Option<PathBuf>,

    #[arg(long, help = "Mixer settings file [default: <base-dir>/mixer_settings.json]")]
    mixer_file: Option<PathBuf>,

    #[arg(long, help = "File reporting battery micro-volts")]
    voltage_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DisplayKind::Log)]
    display: DisplayKind,

    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    #[arg(long, default_value_t = 1024)]
    buffer_size: usize,

    #[arg(long, help = "Only log power commands")]
    dry_run: bool,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub soundfont_dir: PathBuf,
    pub midi_dir: PathBuf,
    pub mixer_path: PathBuf,
    pub voltage_path: Option<PathBuf>,
    pub display: DisplayKind,
    pub output: OutputParams,
    pub dry_run: bool,
    pub log_level: Level,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let base = args.base_dir;
        Self {
            soundfont_dir: args.soundfonts.unwrap_or_else(|| base.join("sf2")),
            midi_dir: args.midi_files.unwrap_or_else(|| base.join("midifiles")),
            mixer_path: args
                .mixer_file
                .unwrap_or_else(|| base.join("mixer_settings.json")),
            voltage_path: args.voltage_path,
            display: args.display,
            output: OutputParams {
                sample_rate: args.sample_rate,
                buffer_size: args.buffer_size,
            },
            dry_run: args.dry_run,
            log_level: args.log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_default_under_base_dir() {
        let config = Config::from(Args::parse_from(["zompler", "--base-dir", "/tmp/z"]));
        assert_eq!(config.soundfont_dir, PathBuf::from("/tmp/z/sf2"));
        assert_eq!(config.midi_dir, PathBuf::from("/tmp/z/midifiles"));
        assert_eq!(config.mixer_path, PathBuf::from("/tmp/z/mixer_settings.json"));
        assert_eq!(config.voltage_path, None);
        assert_eq!(config.display, DisplayKind::Log);
        assert_eq!(config.output.sample_rate, 44100);
        assert_eq!(config.output.buffer_size, 1024);
        assert_eq!(config.log_level, Level::INFO);
        assert!(!config.dry_run);
    }

    #[test]
    fn explicit_options_override_defaults() {
        let config = Config::from(Args::parse_from([
            "zompler",
            "--soundfonts",
            "/media/sf",
            "--display",
            "none",
            "--sample-rate",
            "48000",
            "--dry-run",
            "--log-level",
            "debug",
            "--voltage-path",
            "/sys/class/power_supply/bat/voltage_now",
        ]));
        assert_eq!(config.soundfont_dir, PathBuf::from("/media/sf"));
        assert_eq!(config.midi_dir, PathBuf::from("/home/pi/midifiles"));
        assert_eq!(config.display, DisplayKind::None);
        assert_eq!(config.output.sample_rate, 48000);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.dry_run);
        assert!(config.voltage_path.is_some());
    }
}
