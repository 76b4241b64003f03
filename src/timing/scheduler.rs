use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::audio::{AudioBackend, VoiceManager};
use crate::config::PlayerConfig;
use crate::events::{MergedEvent, NoteAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loaded,
    Playing,
    Paused,
    Stopped,
}

/// What the caller should do with its timer after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick again after the poll interval.
    Continue,
    /// Nothing left to schedule; leave the timer disarmed.
    Finished,
}

/// One loaded track and the playback position within it.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    events: Arc<[MergedEvent]>,
    cursor: usize,
    /// Backend time that corresponds to `time_seconds == 0`.
    origin_start: f64,
    looping: bool,
    /// Track time at which playback was paused.
    paused_at: Option<f64>,
}

impl PlaybackSession {
    fn new(events: Arc<[MergedEvent]>) -> Self {
        Self {
            events,
            cursor: 0,
            origin_start: 0.0,
            looping: false,
            paused_at: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time_seconds)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn origin_start(&self) -> f64 {
        self.origin_start
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Lookahead scheduler that feeds a loaded track to the audio backend.
///
/// Each [`tick`](PlaybackScheduler::tick) dispatches the events due within
/// `[now, now + lookahead)` of the backend clock. The backend does the
/// precise timing; the tick only has to run more often than the lookahead.
/// Events found already in the past are dropped instead of played late.
#[derive(Debug)]
pub struct PlaybackScheduler {
    state: PlaybackState,
    session: Option<PlaybackSession>,
    voices: VoiceManager,
    lookahead: f64,
    loop_tail: f64,
    volume_smoothing: f64,
}

impl PlaybackScheduler {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            state: PlaybackState::Idle,
            session: None,
            voices: VoiceManager::new(config.wave, config.voice_gain),
            lookahead: config.lookahead_secs(),
            loop_tail: config.loop_tail_secs,
            volume_smoothing: config.volume_smoothing_secs,
        }
    }

    /// Replaces the current session, silencing whatever it was playing.
    pub fn load(&mut self, backend: &mut dyn AudioBackend, events: Arc<[MergedEvent]>) {
        self.voices.stop_all(backend);
        debug!(events = events.len(), "loaded session");
        self.session = Some(PlaybackSession::new(events));
        self.state = PlaybackState::Loaded;
    }

    /// Starts the loaded session from the beginning and dispatches its first
    /// window. Returns `false` when there is nothing to play.
    pub fn play(&mut self, backend: &mut dyn AudioBackend, looping: bool) -> bool {
        self.voices.stop_all(backend);
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.is_empty() {
            return false;
        }
        let now = backend.now();
        session.origin_start = now;
        session.cursor = 0;
        session.looping = looping;
        session.paused_at = None;
        self.state = PlaybackState::Playing;
        info!(
            looping,
            duration = session.duration(),
            "playback started"
        );
        self.tick_at(backend, now);
        true
    }

    /// Silences every voice at once and drops the session.
    pub fn stop(&mut self, backend: &mut dyn AudioBackend) {
        self.voices.stop_all(backend);
        if self.session.take().is_some() {
            info!("playback stopped");
        }
        self.state = PlaybackState::Idle;
    }

    /// Freezes playback, silencing every voice. Events that had been handed
    /// to the backend but were not yet due are scheduled again on resume, and
    /// notes that were held at the pause point sound again from the resume
    /// time.
    pub fn pause(&mut self, backend: &mut dyn AudioBackend) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let elapsed = (backend.now() - session.origin_start).max(0.0);
        self.voices.stop_all(backend);
        session.cursor = session
            .events
            .partition_point(|e| e.time_seconds < elapsed);
        session.paused_at = Some(elapsed);
        self.state = PlaybackState::Paused;
        debug!(elapsed, "playback paused");
        true
    }

    pub fn resume(&mut self, backend: &mut dyn AudioBackend) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let elapsed = session.paused_at.take().unwrap_or(0.0);
        let now = backend.now();
        session.origin_start = now - elapsed;
        let held = held_notes(&session.events[..session.cursor]);
        for &note in &held {
            self.voices.start_voice(backend, note, now);
        }
        self.state = PlaybackState::Playing;
        debug!(elapsed, held = held.len(), "playback resumed");
        self.tick_at(backend, now);
        true
    }

    pub fn set_volume(&mut self, backend: &mut dyn AudioBackend, volume: f32) {
        backend.set_output_gain(volume.clamp(0.0, 1.0), self.volume_smoothing);
    }

    /// Dispatches everything due within the lookahead window and handles the
    /// end of the track.
    pub fn tick(&mut self, backend: &mut dyn AudioBackend) -> TickOutcome {
        let now = backend.now();
        self.tick_at(backend, now)
    }

    // Starting and resuming dispatch against the same `now` they anchored
    // `origin_start` to, so the first event is never judged late.
    fn tick_at(&mut self, backend: &mut dyn AudioBackend, now: f64) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Finished;
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Finished;
        };

        dispatch_window(session, &mut self.voices, backend, now, self.lookahead);

        if session.cursor < session.events.len() {
            return TickOutcome::Continue;
        }

        let end = session.origin_start + session.duration();
        if session.looping {
            if now >= end + self.loop_tail {
                debug!(origin = now, "restarting loop");
                session.origin_start = now;
                session.cursor = 0;
                dispatch_window(session, &mut self.voices, backend, now, self.lookahead);
            }
            TickOutcome::Continue
        } else {
            self.voices.release_all(backend, end.max(now));
            self.state = PlaybackState::Stopped;
            info!("playback finished");
            TickOutcome::Finished
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn duration(&self) -> f64 {
        self.session.as_ref().map_or(0.0, PlaybackSession::duration)
    }

    /// Track time of the playback position, in seconds.
    pub fn position(&self, now: f64) -> f64 {
        let Some(session) = self.session.as_ref() else {
            return 0.0;
        };
        match self.state {
            PlaybackState::Playing => (now - session.origin_start).clamp(0.0, session.duration()),
            PlaybackState::Paused => session.paused_at.unwrap_or(0.0).min(session.duration()),
            PlaybackState::Stopped => session.duration(),
            PlaybackState::Idle | PlaybackState::Loaded => 0.0,
        }
    }
}

/// Notes left sounding after `events`, oldest first, with note-offs matched
/// the way [`VoiceManager::stop_voice`] matches them.
fn held_notes(events: &[MergedEvent]) -> Vec<u8> {
    let mut held: Vec<u8> = Vec::new();
    for event in events {
        let note = event.message.note;
        match event.message.action {
            NoteAction::On => held.push(note),
            NoteAction::Off => {
                if let Some(index) = held.iter().position(|&n| n == note) {
                    held.remove(index);
                }
            }
        }
    }
    held
}

fn dispatch_window(
    session: &mut PlaybackSession,
    voices: &mut VoiceManager,
    backend: &mut dyn AudioBackend,
    now: f64,
    lookahead: f64,
) {
    let horizon = now + lookahead;
    while let Some(event) = session.events.get(session.cursor) {
        let at = session.origin_start + event.time_seconds;
        if at >= horizon {
            break;
        }
        if at >= now {
            match event.message.action {
                NoteAction::On => voices.start_voice(backend, event.message.note, at),
                NoteAction::Off => {
                    voices.stop_voice(backend, event.message.note, at);
                }
            }
        } else {
            trace!(at, now, note = event.message.note, "dropping late event");
        }
        session.cursor += 1;
    }
}
