use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, CpalBackend};
use crate::config::PlayerConfig;
use crate::error::{BackendError, ParseError};
use crate::events::MergedEvent;
use crate::library::{MusicLibrary, MusicTrack};
use crate::timing::{PlaybackScheduler, PlaybackState, TickOutcome, TickTimer, TickToken};
use crate::volume::VolumeProvider;

#[derive(Debug)]
pub enum EngineCommand {
    Load(Arc<[MergedEvent]>),
    Play { looping: bool },
    Stop,
    Pause,
    Resume,
    SetVolume(f32),
    PlayMusic { key: String, looping: bool },
    StopMusic,
    UpdateVolumes,
    SetDucked(bool),
    Flush(Sender<()>),
    Shutdown,
}

/// Snapshot of the engine, republished after every command and tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub current_key: Option<String>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub active_voices: usize,
    pub device_available: bool,
}

/// The music player service. Owns the engine thread, which owns the audio
/// backend and the scheduler; every call here is a message to that thread.
///
/// When no audio device can be opened the service still runs, and every
/// playback call does nothing.
pub struct MusicService {
    command_tx: Sender<EngineCommand>,
    status: Arc<ArcSwap<PlayerStatus>>,
    library: Arc<RwLock<MusicLibrary>>,
    thread: Option<JoinHandle<()>>,
}

impl MusicService {
    /// Starts the engine on the default cpal output device.
    pub fn init(
        config: PlayerConfig,
        library: MusicLibrary,
        volume: Arc<dyn VolumeProvider>,
    ) -> Self {
        Self::with_backend(config, library, volume, |config| {
            CpalBackend::open(config).map(|backend| Box::new(backend) as Box<dyn AudioBackend>)
        })
    }

    /// Starts the engine with a backend built on the engine thread by
    /// `open_backend`.
    pub fn with_backend<F>(
        config: PlayerConfig,
        library: MusicLibrary,
        volume: Arc<dyn VolumeProvider>,
        open_backend: F,
    ) -> Self
    where
        F: FnOnce(&PlayerConfig) -> Result<Box<dyn AudioBackend>, BackendError> + Send + 'static,
    {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let status = Arc::new(ArcSwap::from_pointee(PlayerStatus::default()));
        let library = Arc::new(RwLock::new(library));

        let status_engine = status.clone();
        let library_engine = library.clone();
        let thread = std::thread::spawn(move || {
            let backend = match open_backend(&config) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!("Music disabled: {}", e);
                    None
                }
            };
            let mut engine = Engine {
                scheduler: PlaybackScheduler::new(&config),
                timer: TickTimer::new(),
                backend,
                library: library_engine,
                volume,
                current_key: None,
                ducked: false,
                status: status_engine,
                config,
            };
            engine.publish_status();
            engine_thread(engine, command_rx);
        });

        Self {
            command_tx,
            status,
            library,
            thread: Some(thread),
        }
    }

    /// Decodes `bytes` and makes it the current session, replacing and
    /// silencing the previous one.
    pub fn load(&self, bytes: &[u8]) -> Result<MusicTrack, ParseError> {
        let track = MusicTrack::from_bytes("untitled", bytes)?;
        self.send(EngineCommand::Load(track.events.clone()));
        Ok(track)
    }

    pub fn play(&self, looping: bool) {
        self.send(EngineCommand::Play { looping });
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    pub fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(EngineCommand::Resume);
    }

    /// Sets the output volume in `[0, 1]`, applied smoothly.
    pub fn set_volume(&self, volume: f32) {
        self.send(EngineCommand::SetVolume(volume));
    }

    pub fn is_playing(&self) -> bool {
        self.status.load().state == PlaybackState::Playing
    }

    pub fn status(&self) -> Arc<PlayerStatus> {
        self.status.load_full()
    }

    /// Plays a library track on loop. Does nothing if it is already playing.
    pub fn play_music(&self, key: &str) {
        self.play_track(key, true);
    }

    pub fn play_track(&self, key: &str, looping: bool) {
        self.send(EngineCommand::PlayMusic {
            key: key.to_string(),
            looping,
        });
    }

    pub fn stop_music(&self) {
        self.send(EngineCommand::StopMusic);
    }

    /// Re-reads the volume settings and applies them.
    pub fn update_volumes(&self) {
        self.send(EngineCommand::UpdateVolumes);
    }

    /// Silences music while other sounds play, and restores it afterwards.
    pub fn set_ducked(&self, ducked: bool) {
        self.send(EngineCommand::SetDucked(ducked));
    }

    pub fn current_music_key(&self) -> Option<String> {
        self.status.load().current_key.clone()
    }

    pub fn music_keys(&self) -> Vec<String> {
        self.library.read().keys()
    }

    pub fn music_duration(&self) -> f64 {
        self.status.load().duration_secs
    }

    pub fn music_time(&self) -> f64 {
        self.status.load().position_secs
    }

    /// Blocks until the engine has handled every command sent before this call.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = crossbeam::channel::bounded(1);
        if self.command_tx.send(EngineCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Stops playback and joins the engine thread.
    pub fn shutdown(mut self) {
        self.shutdown_engine();
    }

    fn shutdown_engine(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.command_tx.send(EngineCommand::Shutdown);
            if thread.join().is_err() {
                warn!("music engine thread panicked");
            }
        }
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.command_tx.send(command);
    }
}

impl Drop for MusicService {
    fn drop(&mut self) {
        self.shutdown_engine();
    }
}

struct Engine {
    scheduler: PlaybackScheduler,
    timer: TickTimer,
    backend: Option<Box<dyn AudioBackend>>,
    library: Arc<RwLock<MusicLibrary>>,
    volume: Arc<dyn VolumeProvider>,
    current_key: Option<String>,
    ducked: bool,
    status: Arc<ArcSwap<PlayerStatus>>,
    config: PlayerConfig,
}

fn engine_thread(mut engine: Engine, command_rx: Receiver<EngineCommand>) {
    loop {
        let received = match engine.timer.next_due() {
            Some(due) => command_rx.recv_deadline(due),
            None => command_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(EngineCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                engine.stop();
                engine.publish_status();
                break;
            }
            Ok(command) => engine.handle(command),
            Err(RecvTimeoutError::Timeout) => {}
        }

        // A busy command queue never times out, so the tick is checked on
        // every pass.
        if let Some(token) = engine.timer.take_due(Instant::now()) {
            engine.on_tick(token);
        }
        engine.publish_status();
    }
    debug!("music engine stopped");
}

impl Engine {
    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Load(events) => {
                self.current_key = None;
                self.load(events);
            }
            EngineCommand::Play { looping } => self.play(looping),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Pause => self.pause(),
            EngineCommand::Resume => self.resume(),
            EngineCommand::SetVolume(volume) => self.set_volume(volume),
            EngineCommand::PlayMusic { key, looping } => self.play_music(key, looping),
            EngineCommand::StopMusic => {
                self.stop();
                self.current_key = None;
            }
            EngineCommand::UpdateVolumes => self.update_volumes(),
            EngineCommand::SetDucked(ducked) => {
                self.ducked = ducked;
                self.update_volumes();
            }
            EngineCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn on_tick(&mut self, token: TickToken) {
        // A tick that was cancelled or superseded must not touch the session.
        if !self.timer.is_current(token) {
            return;
        }
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        match self.scheduler.tick(backend) {
            TickOutcome::Continue => self.arm_tick(),
            TickOutcome::Finished => self.timer.cancel(),
        }
    }

    fn arm_tick(&mut self) {
        self.timer.arm(Instant::now(), self.config.poll_interval());
    }

    fn load(&mut self, events: Arc<[MergedEvent]>) {
        self.timer.cancel();
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        self.scheduler.load(backend, events);
    }

    fn play(&mut self, looping: bool) {
        self.timer.cancel();
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        if self.scheduler.play(backend, looping) && self.scheduler.is_playing() {
            self.arm_tick();
        }
    }

    fn stop(&mut self) {
        self.timer.cancel();
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        self.scheduler.stop(backend);
    }

    fn pause(&mut self) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        if self.scheduler.pause(backend) {
            self.timer.cancel();
        }
    }

    fn resume(&mut self) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        if self.scheduler.resume(backend) && self.scheduler.is_playing() {
            self.arm_tick();
        }
    }

    fn set_volume(&mut self, volume: f32) {
        let Some(backend) = self.backend.as_deref_mut() else {
            return;
        };
        self.scheduler.set_volume(backend, volume);
    }

    fn update_volumes(&mut self) {
        let volume = if self.ducked {
            0.0
        } else {
            self.volume.master() * self.volume.music() * self.config.music_gain_scale
        };
        self.set_volume(volume);
    }

    fn play_music(&mut self, key: String, looping: bool) {
        self.update_volumes();
        if self.backend.is_none() {
            return;
        }
        if self.current_key.as_deref() == Some(key.as_str()) && self.scheduler.is_playing() {
            return;
        }

        let events = self.library.read().get(&key).map(|t| t.events.clone());
        let Some(events) = events else {
            warn!("Music '{}' not found or not loaded", key);
            self.stop();
            self.current_key = None;
            return;
        };

        info!("Playing music '{}'", key);
        self.current_key = Some(key);
        self.load(events);
        self.play(looping);
    }

    fn publish_status(&self) {
        let now = self.backend.as_deref().map_or(0.0, |b| b.now());
        self.status.store(Arc::new(PlayerStatus {
            state: self.scheduler.state(),
            current_key: self.current_key.clone(),
            position_secs: self.scheduler.position(now),
            duration_secs: self.scheduler.duration(),
            active_voices: self.scheduler.active_voices(),
            device_available: self.backend.is_some(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BackendCall, OfflineBackend};
    use crate::smf::test_file;
    use crate::volume::VolumeSettings;
    use parking_lot::Mutex;

    fn library() -> MusicLibrary {
        let long_note = test_file(96, &[&[0x00, 0x90, 60, 100, 0x83, 0x00, 0x80, 60, 0]]);
        let mut library = MusicLibrary::new();
        library.insert_bytes("field", &long_note).unwrap();
        library.insert_bytes("town", &long_note).unwrap();
        library
    }

    fn service(volume: Arc<VolumeSettings>) -> (MusicService, Arc<Mutex<Vec<BackendCall>>>) {
        let backend = OfflineBackend::realtime();
        let log = backend.log();
        let service = MusicService::with_backend(
            PlayerConfig::default(),
            library(),
            volume,
            move |_| Ok(Box::new(backend) as Box<dyn AudioBackend>),
        );
        (service, log)
    }

    fn count(log: &Mutex<Vec<BackendCall>>, pred: impl Fn(&BackendCall) -> bool) -> usize {
        log.lock().iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn play_music_loads_and_loops_a_library_track() {
        let (service, log) = service(Arc::new(VolumeSettings::new(1.0, 0.5)));
        service.play_music("town");
        service.flush();

        let status = service.status();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.current_key.as_deref(), Some("town"));
        assert!(status.device_available);
        assert!(service.is_playing());
        assert!((service.music_duration() - 2.0).abs() < 1e-9);
        assert!((0.0..=2.0).contains(&service.music_time()));
        assert!(log.lock().contains(&BackendCall::OutputGain {
            target: 0.3,
            time_constant: 0.1
        }));
        assert_eq!(count(&log, |c| matches!(c, BackendCall::Start { .. })), 1);
    }

    #[test]
    fn replaying_the_current_track_is_a_no_op() {
        let (service, log) = service(Arc::default());
        service.play_music("town");
        service.play_music("town");
        service.flush();
        assert_eq!(count(&log, |c| matches!(c, BackendCall::Start { .. })), 1);

        service.play_music("field");
        service.flush();
        assert_eq!(service.current_music_key().as_deref(), Some("field"));
        assert_eq!(count(&log, |c| matches!(c, BackendCall::Kill { .. })), 1);
    }

    #[test]
    fn ticks_keep_running_while_commands_stream_in() {
        let two_notes = test_file(
            96,
            &[&[
                0x00, 0x90, 60, 100, 0x60, 0x80, 60, 0, // C4 from 0.0s to 0.5s
                0x00, 0x90, 64, 100, 0x60, 0x80, 64, 0, // E4 from 0.5s to 1.0s
            ]],
        );
        let mut library = MusicLibrary::new();
        library.insert_bytes("steps", &two_notes).unwrap();
        let backend = OfflineBackend::realtime();
        let log = backend.log();
        let service = MusicService::with_backend(
            PlayerConfig::default(),
            library,
            Arc::new(VolumeSettings::default()),
            move |_| Ok(Box::new(backend) as Box<dyn AudioBackend>),
        );

        service.play_track("steps", false);
        let started = Instant::now();
        while started.elapsed() < std::time::Duration::from_millis(900) {
            service.update_volumes();
        }
        service.flush();

        assert_eq!(count(&log, |c| matches!(c, BackendCall::Start { .. })), 2);
    }

    #[test]
    fn unknown_track_stops_music() {
        let (service, _log) = service(Arc::default());
        service.play_music("town");
        service.play_music("missing");
        service.flush();

        let status = service.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.current_key, None);
        assert_eq!(status.active_voices, 0);
    }

    #[test]
    fn stop_silences_voices_and_cancels_ticks() {
        let (service, log) = service(Arc::default());
        service.play_music("town");
        service.stop();
        service.flush();

        assert!(!service.is_playing());
        assert_eq!(service.status().active_voices, 0);
        assert_eq!(count(&log, |c| matches!(c, BackendCall::Kill { .. })), 1);

        let calls_after_stop = log.lock().len();
        std::thread::sleep(std::time::Duration::from_millis(250));
        service.flush();
        assert_eq!(log.lock().len(), calls_after_stop);
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let (service, _log) = service(Arc::default());
        service.play_music("field");
        service.pause();
        service.flush();
        assert_eq!(service.status().state, PlaybackState::Paused);
        let paused_at = service.music_time();
        std::thread::sleep(std::time::Duration::from_millis(20));
        service.flush();
        assert_eq!(service.music_time(), paused_at);
        assert!(!service.is_playing());

        service.resume();
        service.flush();
        assert!(service.is_playing());
    }

    #[test]
    fn ducking_silences_and_restores_music() {
        let (service, log) = service(Arc::new(VolumeSettings::new(0.5, 1.0)));
        service.set_ducked(true);
        service.set_ducked(false);
        service.flush();

        let gains: Vec<f32> = log
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::OutputGain { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(gains, vec![0.0, 0.3]);
    }

    #[test]
    fn loading_bytes_reports_parse_errors() {
        let (service, _log) = service(Arc::default());
        assert!(matches!(
            service.load(b"XXXX\0\0\0\x06\0\0\0\x01\0\x60"),
            Err(ParseError::InvalidHeader { .. })
        ));

        let track = service
            .load(&test_file(96, &[&[0x00, 0x90, 64, 100]]))
            .unwrap();
        assert_eq!(track.events.len(), 1);
        service.play(false);
        service.flush();
        assert_eq!(service.status().current_key, None);
    }

    #[test]
    fn missing_device_makes_playback_a_no_op() {
        let service = MusicService::with_backend(
            PlayerConfig::default(),
            library(),
            Arc::new(VolumeSettings::default()),
            |_| Err(BackendError::DeviceUnavailable),
        );
        service.play_music("town");
        service.set_volume(0.5);
        service.stop();
        service.flush();

        let status = service.status();
        assert!(!status.device_available);
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(service.music_keys(), vec!["field".to_string(), "town".to_string()]);
        service.shutdown();
    }
}
