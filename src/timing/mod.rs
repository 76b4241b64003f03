mod scheduler;
mod tempo_map;
mod timer;

pub use scheduler::{PlaybackScheduler, PlaybackSession, PlaybackState, TickOutcome};
pub use tempo_map::{DEFAULT_MICROSECONDS_PER_BEAT, merge_tracks, seconds_per_tick};
pub use timer::{TickTimer, TickToken};
