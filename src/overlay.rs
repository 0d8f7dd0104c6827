use std::time::{Duration, Instant};

use crate::channel_map::ChannelKind;

pub const FADE_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub channel: u8,
    pub start: Instant,
    pub kind: ChannelKind,
}

impl Overlay {
    /// 255 right after the trigger, linearly down to 0 at [`FADE_DURATION`];
    /// `None` once faded out.
    pub fn alpha(&self, now: Instant) -> Option<u8> {
        let elapsed = now.saturating_duration_since(self.start);
        if elapsed >= FADE_DURATION {
            None
        } else {
            let t = elapsed.as_secs_f32() / FADE_DURATION.as_secs_f32();
            Some((255.0 * (1.0 - t)) as u8)
        }
    }

    pub fn is_shown(&self, now: Instant) -> bool {
        self.alpha(now).is_some()
    }
}

/// "Now playing" notifications, one slot for the drum channel and one for the
/// most recently triggered melodic channel. Each slot fades independently.
#[derive(Debug, Clone, Default)]
pub struct OverlayManager {
    drum: Option<Overlay>,
    melodic: Option<Overlay>,
}

impl OverlayManager {
    /// Called on every note-on edge. A visible overlay for the same channel is
    /// left alone; otherwise the slot restarts its fade clock. Returns whether
    /// a fresh overlay was started.
    pub fn note_on(&mut self, channel: u8, now: Instant) -> bool {
        let kind = ChannelKind::of_engine_channel(channel);
        let slot = match kind {
            ChannelKind::Drum => &mut self.drum,
            ChannelKind::Melodic => &mut self.melodic,
        };
        let visible_same_channel = slot
            .as_ref()
            .is_some_and(|o| o.is_shown(now) && o.channel == channel);
        if visible_same_channel {
            false
        } else {
            *slot = Some(Overlay {
                channel,
                start: now,
                kind,
            });
            true
        }
    }

    /// Clears slots whose fade has completed.
    pub fn expire(&mut self, now: Instant) {
        for slot in [&mut self.drum, &mut self.melodic] {
            if slot.as_ref().is_some_and(|o| !o.is_shown(now)) {
                *slot = None;
            }
        }
    }

    pub fn drum(&self, now: Instant) -> Option<(Overlay, u8)> {
        visible(self.drum, now)
    }

    pub fn melodic(&self, now: Instant) -> Option<(Overlay, u8)> {
        visible(self.melodic, now)
    }
}

fn visible(slot: Option<Overlay>, now: Instant) -> Option<(Overlay, u8)> {
    let overlay = slot?;
    overlay.alpha(now).map(|alpha| (overlay, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn alpha_fades_linearly() {
        let start = Instant::now();
        let o = Overlay {
            channel: 0,
            start,
            kind: ChannelKind::Melodic,
        };
        assert_eq!(o.alpha(start), Some(255));
        assert_eq!(o.alpha(start + ms(2000)), Some(127));
        assert_eq!(o.alpha(start + ms(3999)).map(|a| a <= 1), Some(true));
        assert_eq!(o.alpha(start + ms(4000)), None);
    }

    #[test]
    fn visible_overlay_is_not_retriggered() {
        let t0 = Instant::now();
        let mut overlays = OverlayManager::default();
        assert!(overlays.note_on(9, t0));
        assert!(!overlays.note_on(9, t0 + ms(1000)));
        assert!(!overlays.note_on(9, t0 + ms(3900)));
        assert_eq!(overlays.drum(t0 + ms(1000)).unwrap().0.start, t0);

        // fully faded: the next note-on starts a new fade
        assert!(overlays.drum(t0 + ms(4000)).is_none());
        assert!(overlays.note_on(9, t0 + ms(4100)));
        assert_eq!(overlays.drum(t0 + ms(4100)).unwrap().1, 255);
    }

    #[test]
    fn drum_and_melodic_are_independent() {
        let t0 = Instant::now();
        let mut overlays = OverlayManager::default();
        overlays.note_on(9, t0);
        overlays.note_on(2, t0 + ms(3000));
        assert!(overlays.drum(t0 + ms(4500)).is_none());
        let (melodic, _) = overlays.melodic(t0 + ms(4500)).unwrap();
        assert_eq!(melodic.channel, 2);
        assert_eq!(melodic.kind, ChannelKind::Melodic);
    }

    #[test]
    fn other_melodic_channel_takes_over() {
        let t0 = Instant::now();
        let mut overlays = OverlayManager::default();
        overlays.note_on(0, t0);
        assert!(overlays.note_on(4, t0 + ms(500)));
        let (melodic, alpha) = overlays.melodic(t0 + ms(500)).unwrap();
        assert_eq!(melodic.channel, 4);
        assert_eq!(alpha, 255);
    }

    #[test]
    fn expire_clears_faded_slots() {
        let t0 = Instant::now();
        let mut overlays = OverlayManager::default();
        overlays.note_on(9, t0);
        overlays.note_on(1, t0 + ms(2000));
        overlays.expire(t0 + ms(4500));
        assert!(overlays.drum.is_none());
        assert!(overlays.melodic.is_some());
    }
}
