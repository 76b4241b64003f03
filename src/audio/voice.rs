use tracing::trace;

use super::{AudioBackend, VoiceHandle, Wave, midi_to_freq};

/// One sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub note: u8,
    pub handle: VoiceHandle,
}

/// Owns every voice started by playback and matches note-offs back to them.
///
/// Note-offs release the oldest voice with the same pitch. Same-pitch voices
/// are not told apart, and the lookup is a linear scan over a list that only
/// ever holds a melody's worth of notes.
#[derive(Debug)]
pub struct VoiceManager {
    active: Vec<Voice>,
    wave: Wave,
    level: f32,
}

impl VoiceManager {
    pub fn new(wave: Wave, level: f32) -> Self {
        Self {
            active: Vec::new(),
            wave,
            level,
        }
    }

    pub fn start_voice(&mut self, backend: &mut dyn AudioBackend, note: u8, at: f64) {
        let handle = backend.start_voice(self.wave, midi_to_freq(note), self.level, at);
        trace!(note, at, "voice on");
        self.active.push(Voice { note, handle });
    }

    /// Schedules the oldest voice playing `note` to stop at `at` and forgets
    /// it. Returns `false` if no voice was playing that note.
    pub fn stop_voice(&mut self, backend: &mut dyn AudioBackend, note: u8, at: f64) -> bool {
        let Some(index) = self.active.iter().position(|v| v.note == note) else {
            return false;
        };
        let voice = self.active.remove(index);
        backend.stop_voice(voice.handle, at);
        trace!(note, at, "voice off");
        true
    }

    /// Schedules every voice to stop at `at`.
    pub fn release_all(&mut self, backend: &mut dyn AudioBackend, at: f64) {
        for voice in self.active.drain(..) {
            backend.stop_voice(voice.handle, at);
        }
    }

    /// Silences every voice immediately.
    pub fn stop_all(&mut self, backend: &mut dyn AudioBackend) {
        for voice in self.active.drain(..) {
            backend.kill_voice(voice.handle);
        }
    }

    pub fn active(&self) -> &[Voice] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BackendCall, OfflineBackend};

    #[test]
    fn starts_voices_at_note_frequency() {
        let mut backend = OfflineBackend::manual();
        let mut voices = VoiceManager::new(Wave::Square, 0.1);
        voices.start_voice(&mut backend, 69, 1.5);

        assert_eq!(voices.len(), 1);
        match backend.calls()[0] {
            BackendCall::Start {
                frequency, at, level, ..
            } => {
                assert_eq!(frequency, 440.0);
                assert_eq!(at, 1.5);
                assert_eq!(level, 0.1);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn note_off_releases_oldest_matching_voice() {
        let mut backend = OfflineBackend::manual();
        let mut voices = VoiceManager::new(Wave::Square, 0.1);
        voices.start_voice(&mut backend, 60, 0.0);
        voices.start_voice(&mut backend, 64, 0.0);
        voices.start_voice(&mut backend, 60, 0.5);
        let first = voices.active()[0].handle;

        assert!(voices.stop_voice(&mut backend, 60, 1.0));
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::Stop {
                voice: first,
                at: 1.0
            })
        );
        let notes: Vec<u8> = voices.active().iter().map(|v| v.note).collect();
        assert_eq!(notes, vec![64, 60]);
    }

    #[test]
    fn unmatched_note_off_is_ignored() {
        let mut backend = OfflineBackend::manual();
        let mut voices = VoiceManager::new(Wave::Square, 0.1);
        voices.start_voice(&mut backend, 60, 0.0);
        backend.clear_calls();

        assert!(!voices.stop_voice(&mut backend, 61, 1.0));
        assert!(backend.calls().is_empty());
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn stop_all_kills_every_voice() {
        let mut backend = OfflineBackend::manual();
        let mut voices = VoiceManager::new(Wave::Sine, 0.1);
        for note in [60, 64, 67] {
            voices.start_voice(&mut backend, note, 10.0);
        }
        backend.clear_calls();

        voices.stop_all(&mut backend);
        assert!(voices.is_empty());
        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| matches!(c, BackendCall::Kill { .. })));
    }
}
