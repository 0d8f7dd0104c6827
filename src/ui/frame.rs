use crate::{
    menu::{Mode, RenameEntry},
    state::{OverlayView, Snapshot},
};

pub const WIDTH: i32 = 240;
pub const HEIGHT: i32 = 240;

const LIST_VIEW_SIZE: usize = 5;
const LIST_LABEL_CHARS: usize = 22;
const MIXER_LABEL_CHARS: usize = 12;
const GAIN_BAR_WIDTH: f32 = 196.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const BLACK: Rgb = Rgb(0, 0, 0);
pub const WHITE: Rgb = Rgb(255, 255, 255);
pub const YELLOW: Rgb = Rgb(255, 255, 0);
pub const GREEN: Rgb = Rgb(0, 255, 0);
pub const RED: Rgb = Rgb(255, 0, 0);
pub const GREY: Rgb = Rgb(200, 200, 200);
const HEADER_BG: Rgb = Rgb(30, 30, 30);
const TITLE_BG: Rgb = Rgb(50, 50, 50);
const MESSAGE_BG: Rgb = Rgb(200, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Small,
    Large,
}

/// Inclusive pixel corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    FillRect {
        rect: Rect,
        color: Rgb,
    },
    OutlineRect {
        rect: Rect,
        color: Rgb,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        size: TextSize,
        color: Rgb,
    },
}

/// One full screen as an ordered display list, painted back to front.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    primitives: Vec<Primitive>,
}

impl Frame {
    pub fn new() -> Self {
        let mut frame = Self::default();
        frame.fill_rect(Rect::new(0, 0, WIDTH, HEIGHT), BLACK);
        frame
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        self.primitives.push(Primitive::FillRect { rect, color });
    }

    pub fn outline_rect(&mut self, rect: Rect, color: Rgb) {
        self.primitives.push(Primitive::OutlineRect { rect, color });
    }

    pub fn text(&mut self, x: i32, y: i32, text: impl Into<String>, size: TextSize, color: Rgb) {
        self.primitives.push(Primitive::Text {
            x,
            y,
            text: text.into(),
            size,
            color,
        });
    }

    pub fn texts(&self) -> Vec<&str> {
        self.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn splash_frame() -> Frame {
    let mut frame = Frame::new();
    frame.text(60, 95, "ZOMPLER", TextSize::Large, WHITE);
    frame.text(85, 135, "loading...", TextSize::Small, Rgb(180, 180, 180));
    frame
}

pub fn halt_frame() -> Frame {
    let mut frame = Frame::new();
    frame.text(45, 100, "SYSTEM HALT", TextSize::Large, RED);
    frame.text(35, 140, "SAFE TO UNPLUG", TextSize::Small, WHITE);
    frame
}

pub fn build(snap: &Snapshot, time_left: &str) -> Frame {
    if snap.mode == Mode::Shutdown {
        return halt_frame();
    }
    let accent = if snap.low_power { YELLOW } else { WHITE };
    let mut frame = Frame::new();

    frame.fill_rect(Rect::new(0, 0, WIDTH, 26), HEADER_BG);
    frame.text(10, 4, format!("TIME: {time_left}"), TextSize::Small, accent);
    if snap.mode == Mode::MidiPortList {
        frame.text(120, 4, snap.connection.label(), TextSize::Small, accent);
    }
    if snap.recording {
        frame.text(200, 4, "REC", TextSize::Small, RED);
    }
    frame.fill_rect(Rect::new(0, 26, WIDTH, 56), TITLE_BG);
    frame.text(10, 31, snap.mode.title(), TextSize::Large, accent);

    match snap.mode {
        Mode::Volume => draw_volume(&mut frame, snap, accent),
        Mode::Rename => draw_rename(&mut frame, snap, accent),
        Mode::Mixer => draw_mixer(&mut frame, snap, accent),
        Mode::Metronome => draw_metronome(&mut frame, snap, accent),
        _ => draw_list(&mut frame, snap, accent),
    }

    if let Some(message) = &snap.message {
        frame.fill_rect(Rect::new(20, 100, 220, 140), MESSAGE_BG);
        frame.text(35, 110, message.as_str(), TextSize::Large, WHITE);
    }

    if let Some(overlay) = &snap.drum_overlay {
        draw_overlay(&mut frame, overlay, HEIGHT - 60);
    }
    if let Some(overlay) = &snap.melodic_overlay {
        draw_overlay(&mut frame, overlay, HEIGHT - 30);
    }
    frame
}

fn draw_volume(frame: &mut Frame, snap: &Snapshot, accent: Rgb) {
    frame.text(30, 90, "MASTER GAIN", TextSize::Large, accent);
    frame.outline_rect(Rect::new(20, 120, 220, 150), accent);
    let fill = (GAIN_BAR_WIDTH * snap.gain_pct as f32 / 100.0) as i32;
    frame.fill_rect(Rect::new(22, 122, 22 + fill, 148), GREEN);
    frame.text(100, 160, format!("{}%", snap.gain_pct), TextSize::Large, accent);
}

fn draw_rename(frame: &mut Frame, snap: &Snapshot, accent: Rgb) {
    frame.text(10, 100, format!("{}_", snap.rename_text), TextSize::Large, GREEN);
    frame.fill_rect(Rect::new(105, 145, 145, 180), accent);
    let label = match snap.rename_entry {
        RenameEntry::Char(' ') => "SP".to_owned(),
        entry => entry.label(),
    };
    frame.text(118, 150, label, TextSize::Large, BLACK);
}

fn draw_mixer(frame: &mut Frame, snap: &Snapshot, accent: Rgb) {
    for (i, slot) in snap.mixer.iter().enumerate() {
        let y = 60 + i as i32 * 18;
        let selected = i == snap.selected;
        let color = if selected { accent } else { GREY };
        if selected && snap.adjusting {
            frame.outline_rect(Rect::new(5, y, 235, y + 16), GREEN);
        }
        let label = format!(
            "{}: {}",
            slot.user_channel,
            truncate(&slot.preset_name, MIXER_LABEL_CHARS)
        );
        frame.text(10, y, label, TextSize::Small, color);
        let bar = (slot.volume as f32 / 1.6) as i32;
        frame.fill_rect(Rect::new(150, y + 4, 150 + bar, y + 12), color);
    }
}

fn draw_metronome(frame: &mut Frame, snap: &Snapshot, accent: Rgb) {
    let m = snap.metronome;
    let rows = [
        format!("STATUS: {}", if m.enabled { "ON" } else { "OFF" }),
        format!("SPEED: {} BPM", m.bpm),
        format!("VOL: {}", m.volume),
    ];
    for (i, row) in rows.into_iter().enumerate() {
        let y = 80 + i as i32 * 40;
        let selected = i == snap.selected;
        let color = if selected { accent } else { GREY };
        if selected {
            let outline = if snap.adjusting { GREEN } else { color };
            frame.outline_rect(Rect::new(10, y - 5, 230, y + 25), outline);
        }
        frame.text(20, y, row, TextSize::Large, color);
    }
}

/// Five-entry window that keeps the selection in the middle where possible.
fn draw_list(frame: &mut Frame, snap: &Snapshot, accent: Rgb) {
    let len = snap.items.len();
    let start = snap
        .selected
        .saturating_sub(2)
        .min(len.saturating_sub(LIST_VIEW_SIZE));
    for (i, label) in snap
        .items
        .iter()
        .enumerate()
        .skip(start)
        .take(LIST_VIEW_SIZE)
    {
        let y = 62 + (i - start) as i32 * 28;
        let color = if i == snap.selected {
            frame.fill_rect(Rect::new(10, y, 230, y + 26), accent);
            BLACK
        } else {
            accent
        };
        frame.text(15, y + 2, truncate(label, LIST_LABEL_CHARS), TextSize::Large, color);
    }
}

fn draw_overlay(frame: &mut Frame, overlay: &OverlayView, y: i32) {
    frame.fill_rect(Rect::new(0, y, WIDTH, y + 30), BLACK);
    frame.text(
        10,
        y + 4,
        format!("CH {} : {}", overlay.channel, overlay.name),
        TextSize::Large,
        Rgb(0, overlay.alpha, 0),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mixer::MixerSettings, state::State};
    use std::time::Instant;

    fn snapshot(state: &State) -> Snapshot {
        state.snapshot(Instant::now())
    }

    #[test]
    fn main_screen() {
        let state = State::new(MixerSettings::default());
        let frame = build(&snapshot(&state), "3:25");
        let texts = frame.texts();
        assert_eq!(texts[0], "TIME: 3:25");
        assert!(texts.contains(&"MAIN SCREEN"));
        // five visible entries starting at the top
        assert!(texts.contains(&"MIDI KEYBOARD"));
        assert!(texts.contains(&"RECORD"));
        assert!(!texts.contains(&"METRONOME"));
    }

    #[test]
    fn list_window_follows_selection() {
        let mut state = State::new(MixerSettings::default());
        for _ in 0..8 {
            state.menu.move_selection(1);
        }
        let frame = build(&snapshot(&state), "0:00");
        let texts = frame.texts();
        assert!(texts.contains(&"SHUTDOWN"));
        assert!(texts.contains(&"RECORD"));
        assert!(!texts.contains(&"MIXER"));
    }

    #[test]
    fn message_and_overlay() {
        let mut state = State::new(MixerSettings::default());
        let now = Instant::now();
        state.show_message("SF2 Loaded", now);
        state.presets.set(9, "StandardKit".into());
        state.overlays.note_on(9, now);
        let frame = build(&state.snapshot(now), "0:00");
        let texts = frame.texts();
        assert!(texts.contains(&"SF2 Loaded"));
        assert!(texts.contains(&"CH 0 : StandardKit"));
        assert!(frame.primitives.contains(&Primitive::Text {
            x: 10,
            y: HEIGHT - 56,
            text: "CH 0 : StandardKit".into(),
            size: TextSize::Large,
            color: Rgb(0, 255, 0),
        }));
    }

    #[test]
    fn mixer_rows() {
        let mut state = State::new(MixerSettings::default());
        state.menu.enter(Mode::Mixer, crate::menu::mixer_items());
        state.menu.adjusting = true;
        state.presets.set(0, "Electric Piano 1".into());
        let frame = build(&snapshot(&state), "0:00");
        let texts = frame.texts();
        assert!(texts.contains(&"1: Electric Pia"));
        assert!(texts.contains(&"0: CH 1"));
        assert!(frame.primitives.contains(&Primitive::OutlineRect {
            rect: Rect::new(5, 60, 235, 76),
            color: GREEN,
        }));
    }

    #[test]
    fn low_power_accent_and_halt() {
        let mut state = State::new(MixerSettings::default());
        state.low_power = true;
        let frame = build(&snapshot(&state), "7:30");
        assert!(frame.primitives.contains(&Primitive::Text {
            x: 10,
            y: 4,
            text: "TIME: 7:30".into(),
            size: TextSize::Small,
            color: YELLOW,
        }));

        state.menu.enter(Mode::Shutdown, vec![]);
        assert_eq!(build(&snapshot(&state), "7:30"), halt_frame());
        assert_eq!(halt_frame().texts(), vec!["SYSTEM HALT", "SAFE TO UNPLUG"]);
    }
}
