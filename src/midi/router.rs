use std::sync::Arc;

use tracing::{debug, info};

use super::{Inbound, Message, MessageKind, Receiver};
use crate::{engine::AudioEngine, state::Shared, state::State};

/// Applies one inbound message: forwards it to the engine, updates the
/// overlays, the preset-name cache and the last-seen program, and feeds
/// the recorder. Returns whether a new overlay appeared.
pub fn route(state: &mut State, engine: &dyn AudioEngine, inbound: Inbound) -> bool {
    let Inbound { message, received } = inbound;
    let ch = message.channel;

    let mut overlay_started = false;
    let res = match message.kind {
        MessageKind::NoteOn { note, velocity } => {
            overlay_started = state.overlays.note_on(ch, received);
            engine.note_on(ch, note, velocity)
        }
        MessageKind::NoteOff { note, .. } => engine.note_off(ch, note),
        MessageKind::ControlChange { controller, value } => {
            engine.control_change(ch, controller, value)
        }
        MessageKind::PitchWheel { value } => {
            engine.pitch_bend(ch, Message::get_pitch_wheel_signed(value))
        }
        MessageKind::ProgramChange { program } => {
            state.last_program = Some(program);
            state.presets.set(ch, format!("Prog {program}"));
            engine.change_program(ch, program)
        }
        MessageKind::PolyphonicAftertouch { .. } | MessageKind::ChannelAftertouch { .. } => Ok(()),
    };
    if let Err(e) = res {
        debug!("Engine rejected {message:?}: {e}");
    }

    if is_recordable(&message.kind) {
        state.recorder.add_event(message, received);
    }
    overlay_started
}

fn is_recordable(kind: &MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::NoteOn { .. }
            | MessageKind::NoteOff { .. }
            | MessageKind::ControlChange { .. }
            | MessageKind::ProgramChange { .. }
            | MessageKind::PitchWheel { .. }
    )
}

pub async fn run(mut rx: Receiver, shared: Arc<Shared>, engine: Arc<dyn AudioEngine>) {
    info!("MIDI router started");
    while let Some(inbound) = rx.recv().await {
        let redraw = {
            let mut state = shared.lock().await;
            route(&mut state, engine.as_ref(), inbound)
        };
        if redraw {
            shared.request_redraw();
        }
    }
    info!("MIDI router stopped");
}
