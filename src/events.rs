/// One decoded track event. `ticks` is cumulative within its own track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub ticks: u64,
    pub kind: RawEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Note(NoteMessage),
    Tempo { microseconds_per_beat: u32 },
    EndOfTrack,
}

impl RawEventKind {
    /// Ordering among events that share a tick: releases first, then tempo
    /// changes, then new notes, then end-of-track markers.
    pub(crate) fn tie_rank(&self) -> u8 {
        match self {
            RawEventKind::Note(NoteMessage {
                action: NoteAction::Off,
                ..
            }) => 0,
            RawEventKind::Tempo { .. } => 1,
            RawEventKind::Note(_) => 2,
            RawEventKind::EndOfTrack => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteMessage {
    pub action: NoteAction,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

impl NoteMessage {
    pub fn on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            action: NoteAction::On,
            channel,
            note,
            velocity,
        }
    }

    pub fn off(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            action: NoteAction::Off,
            channel,
            note,
            velocity,
        }
    }
}

/// A note event placed on the absolute timeline, in seconds from the start
/// of the track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedEvent {
    pub time_seconds: f64,
    pub message: NoteMessage,
}
