// Resources:
// https://www.songstuff.com/recording/article/midi_message_format/

#[derive(Debug, Clone, PartialEq, Copy)]
pub enum MessageKind {
    NoteOff { note: u8, velocity: u8 },
    NoteOn { note: u8, velocity: u8 },
    PolyphonicAftertouch { note: u8, pressure: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelAftertouch { pressure: u8 },
    PitchWheel { value: u16 },
}

#[derive(Debug, Clone, PartialEq, Copy)]
pub struct Message {
    pub kind: MessageKind,
    pub channel: u8,
}

impl Message {
    /// Decodes one channel-voice message. System messages and truncated
    /// data yield `None`. A note-on with velocity 0 decodes as a note-off.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            decode_non_empty_message(bytes)
        }
    }

    pub fn get_pitch_wheel_signed(value: u16) -> i16 {
        (value as i16) - 8192
    }
}

fn decode_non_empty_message(bytes: &[u8]) -> Option<Message> {
    let cmd = bytes[0] & 0xF0;
    let channel = bytes[0] & 0x0F;
    let kind = match cmd {
        0x80 => parse_note_off(bytes)?,
        0x90 => parse_note_on(bytes)?,
        0xA0 => parse_polyphonic_aftertouch(bytes)?,
        0xB0 => parse_control_change(bytes)?,
        0xC0 => parse_program_change(bytes)?,
        0xD0 => parse_channel_aftertouch(bytes)?,
        0xE0 => parse_pitch_wheel(bytes)?,
        _ => None?,
    };
    Some(Message { kind, channel })
}

fn parse_note_on(bytes: &[u8]) -> Option<MessageKind> {
    let (note, velocity) = data2(bytes)?;
    if velocity == 0 {
        Some(MessageKind::NoteOff { note, velocity })
    } else {
        Some(MessageKind::NoteOn { note, velocity })
    }
}

fn parse_note_off(bytes: &[u8]) -> Option<MessageKind> {
    let (note, velocity) = data2(bytes)?;
    Some(MessageKind::NoteOff { note, velocity })
}

fn parse_polyphonic_aftertouch(bytes: &[u8]) -> Option<MessageKind> {
    let (note, pressure) = data2(bytes)?;
    Some(MessageKind::PolyphonicAftertouch { note, pressure })
}

fn parse_control_change(bytes: &[u8]) -> Option<MessageKind> {
    let (controller, value) = data2(bytes)?;
    Some(MessageKind::ControlChange { controller, value })
}

fn parse_program_change(bytes: &[u8]) -> Option<MessageKind> {
    Some(MessageKind::ProgramChange {
        program: data1(bytes)?,
    })
}

fn parse_channel_aftertouch(bytes: &[u8]) -> Option<MessageKind> {
    Some(MessageKind::ChannelAftertouch {
        pressure: data1(bytes)?,
    })
}

fn parse_pitch_wheel(bytes: &[u8]) -> Option<MessageKind> {
    let (lsb, msb) = data2(bytes)?;
    let value = (lsb as u16) | ((msb as u16) << 7);
    Some(MessageKind::PitchWheel { value })
}

fn data1(bytes: &[u8]) -> Option<u8> {
    bytes.get(1).map(|b| b & 0x7F)
}

fn data2(bytes: &[u8]) -> Option<(u8, u8)> {
    if bytes.len() < 3 {
        None
    } else {
        Some((bytes[1] & 0x7F, bytes[2] & 0x7F))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        let a = Message::decode(&[0x93, 60, 0]).unwrap();
        let b = Message::decode(&[0x83, 60, 0]).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.kind,
            MessageKind::NoteOff {
                note: 60,
                velocity: 0
            }
        );
        assert_eq!(a.channel, 3);
    }

    #[test]
    fn decode_kinds() {
        assert_eq!(
            Message::decode(&[0xB9, 7, 100]).unwrap().kind,
            MessageKind::ControlChange {
                controller: 7,
                value: 100
            }
        );
        assert_eq!(
            Message::decode(&[0xC1, 5]).unwrap().kind,
            MessageKind::ProgramChange { program: 5 }
        );
        assert_eq!(
            Message::decode(&[0xE0, 0x00, 0x40]).unwrap().kind,
            MessageKind::PitchWheel { value: 8192 }
        );
    }

    #[test]
    fn reject_truncated_and_system() {
        assert_eq!(Message::decode(&[]), None);
        assert_eq!(Message::decode(&[0x90, 60]), None);
        assert_eq!(Message::decode(&[0xC0]), None);
        assert_eq!(Message::decode(&[0xF8]), None);
    }

    #[test]
    fn pitch_wheel_signed() {
        assert_eq!(Message::get_pitch_wheel_signed(8192), 0);
        assert_eq!(Message::get_pitch_wheel_signed(0), -8192);
        assert_eq!(Message::get_pitch_wheel_signed(16383), 8191);
    }
}
