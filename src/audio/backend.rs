use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::Wave;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OscillatorHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GainHandle(pub u64);

/// The backend resources behind one sounding note: an oscillator feeding its
/// own gain stage, which feeds the shared output bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub oscillator: OscillatorHandle,
    pub gain: GainHandle,
}

/// The audio-rendering side of playback.
///
/// Times are in seconds on the backend's own monotonic clock, which is the
/// only clock the scheduler trusts.
pub trait AudioBackend {
    fn now(&self) -> f64;

    /// Creates a voice that starts sounding at `at`.
    fn start_voice(&mut self, wave: Wave, frequency: f32, level: f32, at: f64) -> VoiceHandle;

    /// Schedules `voice` to fall silent at `at`. The backend frees it afterwards.
    fn stop_voice(&mut self, voice: VoiceHandle, at: f64);

    /// Silences and frees `voice` right away, whatever was scheduled for it.
    fn kill_voice(&mut self, voice: VoiceHandle);

    /// Moves the shared output gain towards `target`, approaching it
    /// exponentially with the given time constant.
    fn set_output_gain(&mut self, target: f32, time_constant: f64);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendCall {
    Start {
        voice: VoiceHandle,
        frequency: f32,
        level: f32,
        at: f64,
    },
    Stop {
        voice: VoiceHandle,
        at: f64,
    },
    Kill {
        voice: VoiceHandle,
    },
    OutputGain {
        target: f32,
        time_constant: f64,
    },
}

#[derive(Debug)]
enum OfflineClock {
    Manual(f64),
    Wall(Instant),
}

/// A backend that renders nothing and records every call.
///
/// With a manual clock, time only moves through [`OfflineBackend::advance`]
/// and [`OfflineBackend::set_time`].
#[derive(Debug)]
pub struct OfflineBackend {
    clock: OfflineClock,
    next_id: u64,
    log: Arc<Mutex<Vec<BackendCall>>>,
}

impl OfflineBackend {
    pub fn manual() -> Self {
        Self::with_clock(OfflineClock::Manual(0.0))
    }

    /// An offline backend whose clock follows wall time.
    pub fn realtime() -> Self {
        Self::with_clock(OfflineClock::Wall(Instant::now()))
    }

    fn with_clock(clock: OfflineClock) -> Self {
        Self {
            clock,
            next_id: 0,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_time(&mut self, seconds: f64) {
        if let OfflineClock::Manual(now) = &mut self.clock {
            *now = seconds;
        }
    }

    pub fn advance(&mut self, seconds: f64) {
        if let OfflineClock::Manual(now) = &mut self.clock {
            *now += seconds;
        }
    }

    /// Shared handle to the call log, readable after the backend has been
    /// moved into another thread.
    pub fn log(&self) -> Arc<Mutex<Vec<BackendCall>>> {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&mut self) {
        self.log.lock().clear();
    }
}

impl AudioBackend for OfflineBackend {
    fn now(&self) -> f64 {
        match &self.clock {
            OfflineClock::Manual(now) => *now,
            OfflineClock::Wall(start) => start.elapsed().as_secs_f64(),
        }
    }

    fn start_voice(&mut self, _wave: Wave, frequency: f32, level: f32, at: f64) -> VoiceHandle {
        let voice = VoiceHandle {
            oscillator: OscillatorHandle(self.next_id),
            gain: GainHandle(self.next_id + 1),
        };
        self.next_id += 2;
        self.log.lock().push(BackendCall::Start {
            voice,
            frequency,
            level,
            at,
        });
        voice
    }

    fn stop_voice(&mut self, voice: VoiceHandle, at: f64) {
        self.log.lock().push(BackendCall::Stop { voice, at });
    }

    fn kill_voice(&mut self, voice: VoiceHandle) {
        self.log.lock().push(BackendCall::Kill { voice });
    }

    fn set_output_gain(&mut self, target: f32, time_constant: f64) {
        self.log.lock().push(BackendCall::OutputGain {
            target,
            time_constant,
        });
    }
}
