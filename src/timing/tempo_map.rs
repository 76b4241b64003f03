use crate::events::{MergedEvent, RawEvent, RawEventKind};
use crate::smf::Smf;

/// Tempo in effect until the first tempo event: 120 BPM.
pub const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

/// Merges every track of `smf` into one note stream on an absolute timeline.
///
/// Events are ordered by tick; at equal ticks note-offs come before tempo
/// changes, which come before note-ons, and remaining ties keep track order.
/// Tempo and end-of-track events only affect timing and are not emitted.
pub fn merge_tracks(smf: &Smf) -> Vec<MergedEvent> {
    let mut merged: Vec<&RawEvent> = smf.tracks.iter().flatten().collect();
    merged.sort_by_key(|event| (event.ticks, event.kind.tie_rank()));

    let division = f64::from(smf.division.max(1));
    let mut current_ticks: u64 = 0;
    let mut current_seconds = 0.0_f64;
    let mut microseconds_per_beat = DEFAULT_MICROSECONDS_PER_BEAT;

    let mut result = Vec::with_capacity(merged.len());
    for event in merged {
        let seconds_per_tick = seconds_per_tick(microseconds_per_beat, division);
        current_seconds += (event.ticks - current_ticks) as f64 * seconds_per_tick;
        current_ticks = event.ticks;

        match event.kind {
            RawEventKind::Tempo {
                microseconds_per_beat: tempo,
            } => microseconds_per_beat = tempo,
            RawEventKind::EndOfTrack => {}
            RawEventKind::Note(message) => result.push(MergedEvent {
                time_seconds: current_seconds,
                message,
            }),
        }
    }
    result
}

pub fn seconds_per_tick(microseconds_per_beat: u32, division: f64) -> f64 {
    f64::from(microseconds_per_beat) / 1_000_000.0 / division
}
