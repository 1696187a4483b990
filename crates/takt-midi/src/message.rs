//! MIDI 1.0 channel-voice messages and their wire encoding.

/// High-nibble status codes for channel-voice messages.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
}

/// A MIDI 1.0 channel-voice message.
///
/// Channels are 0-15; data fields are clamped to 7 bits on encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    /// Start a note
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Release a note
    NoteOff { channel: u8, key: u8, velocity: u8 },
    /// Per-key aftertouch
    PolyPressure { channel: u8, key: u8, pressure: u8 },
    /// Continuous controller change
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Patch select
    ProgramChange { channel: u8, program: u8 },
    /// Channel-wide aftertouch
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit pitch bend, 8192 = center
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// The channel this message is addressed to (0-15).
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => channel & 0x0F,
        }
    }

    /// High-nibble status class (channel bits zeroed).
    pub fn status_class(&self) -> u8 {
        match self {
            Self::NoteOn { .. } => status::NOTE_ON,
            Self::NoteOff { .. } => status::NOTE_OFF,
            Self::PolyPressure { .. } => status::POLY_PRESSURE,
            Self::ControlChange { .. } => status::CONTROL_CHANGE,
            Self::ProgramChange { .. } => status::PROGRAM_CHANGE,
            Self::ChannelPressure { .. } => status::CHANNEL_PRESSURE,
            Self::PitchBend { .. } => status::PITCH_BEND,
        }
    }

    /// Full status byte: class nibble plus channel.
    pub fn status(&self) -> u8 {
        self.status_class() | self.channel()
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, Self::NoteOff { .. })
    }

    /// Encode into raw MIDI 1.0 bytes.
    ///
    /// Writes into `out` and returns the number of bytes used
    /// (2 or 3 depending on the message).
    pub fn encode(&self, out: &mut [u8; 3]) -> usize {
        match *self {
            Self::NoteOn { key, velocity, .. } => {
                out[0] = self.status();
                out[1] = key & 0x7F;
                out[2] = velocity & 0x7F;
                3
            }
            Self::NoteOff { key, velocity, .. } => {
                out[0] = self.status();
                out[1] = key & 0x7F;
                out[2] = velocity & 0x7F;
                3
            }
            Self::PolyPressure { key, pressure, .. } => {
                out[0] = self.status();
                out[1] = key & 0x7F;
                out[2] = pressure & 0x7F;
                3
            }
            Self::ControlChange {
                controller, value, ..
            } => {
                out[0] = self.status();
                out[1] = controller & 0x7F;
                out[2] = value & 0x7F;
                3
            }
            Self::ProgramChange { program, .. } => {
                out[0] = self.status();
                out[1] = program & 0x7F;
                2
            }
            Self::ChannelPressure { pressure, .. } => {
                out[0] = self.status();
                out[1] = pressure & 0x7F;
                2
            }
            Self::PitchBend { value, .. } => {
                out[0] = self.status();
                out[1] = (value & 0x7F) as u8;
                out[2] = ((value >> 7) & 0x7F) as u8;
                3
            }
        }
    }
}
