use more_asserts::{assert_ge, assert_le};
use smf_player::audio::{AudioBackend, BackendCall, OfflineBackend};
use smf_player::events::NoteAction;
use smf_player::smf::SmfDecoder;
use smf_player::timing::{PlaybackScheduler, PlaybackState, TickOutcome, merge_tracks};
use smf_player::{MusicTrack, PlayerConfig};

fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut bytes = tag.to_vec();
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Two-track format 1 file at 96 ticks per quarter: a conductor track that
/// doubles the tempo after one beat, and a four-note melody.
fn song() -> Vec<u8> {
    let mut bytes = b"MThd".to_vec();
    bytes.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 2, 0, 96]);
    bytes.extend(chunk(
        b"MTrk",
        &[
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 us per beat
            0x60, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // 250000 us per beat
            0x00, 0xFF, 0x2F, 0x00,
        ],
    ));
    bytes.extend(chunk(b"INFO", b"skip me"));
    bytes.extend(chunk(
        b"MTrk",
        &[
            0x00, 0xC0, 0x50, // program change, ignored
            0x00, 0x90, 60, 100, // C4 on
            0x60, 60, 0, // running status, C4 off at one beat
            0x00, 64, 100, // E4 on
            0x60, 0x80, 64, 0, // E4 off
            0x00, 0x90, 67, 100, // G4 on
            0x60, 67, 0, // G4 off
            0x00, 0xFF, 0x2F, 0x00,
        ],
    ));
    bytes
}

#[test]
fn decodes_and_maps_a_multi_track_file() {
    let smf = SmfDecoder::decode(&song()).unwrap();
    assert_eq!(smf.division, 96);
    assert_eq!(smf.tracks.len(), 2);
    assert_eq!(smf.skipped_chunks, vec!["INFO".to_string()]);

    let merged = merge_tracks(&smf);
    let times: Vec<f64> = merged.iter().map(|e| e.time_seconds).collect();
    let expected = [0.0, 0.5, 0.5, 0.75, 0.75, 1.0];
    assert_eq!(times.len(), expected.len());
    for (time, want) in times.iter().zip(expected) {
        assert!((time - want).abs() < 1e-9, "{times:?}");
    }
    for pair in merged.windows(2) {
        assert_le!(pair[0].time_seconds, pair[1].time_seconds);
    }
    assert_eq!(merged[1].message.action, NoteAction::Off);
    assert_eq!(merged[2].message.action, NoteAction::On);
}

#[test]
fn plays_a_decoded_track_through_a_loop() {
    let track = MusicTrack::from_bytes("song", &song()).unwrap();
    assert!((track.duration() - 1.0).abs() < 1e-9);

    let config = PlayerConfig::default();
    let mut backend = OfflineBackend::manual();
    backend.set_time(3.0);
    let mut scheduler = PlaybackScheduler::new(&config);
    scheduler.load(&mut backend, track.events.clone());
    assert!(scheduler.play(&mut backend, true));
    let first_origin = scheduler.session().unwrap().origin_start();

    let mut origins = vec![first_origin];
    for _ in 0..40 {
        backend.advance(0.1);
        assert_eq!(scheduler.tick(&mut backend), TickOutcome::Continue);
        let origin = scheduler.session().unwrap().origin_start();
        if origin != *origins.last().unwrap() {
            origins.push(origin);
        }
    }

    assert_ge!(origins.len(), 2);
    for pair in origins.windows(2) {
        assert_ge!(pair[1], pair[0] + track.duration() + config.loop_tail_secs);
    }

    // Every completed pass starts its notes exactly at origin + event time;
    // the last pass may only have dispatched its first window.
    let starts: Vec<f64> = backend
        .calls()
        .iter()
        .filter_map(|c| match c {
            BackendCall::Start { at, .. } => Some(*at),
            _ => None,
        })
        .collect();
    let (last, completed) = origins.split_last().unwrap();
    assert!(starts.iter().any(|at| (at - last).abs() < 1e-9));
    for origin in completed {
        for offset in [0.0, 0.5, 0.75] {
            let want = origin + offset;
            assert!(
                starts.iter().any(|at| (at - want).abs() < 1e-9),
                "missing note at {want}: {starts:?}"
            );
        }
    }

    backend.advance(0.05);
    scheduler.stop(&mut backend);
    assert_eq!(scheduler.active_voices(), 0);
    assert_eq!(scheduler.state(), PlaybackState::Idle);
}

#[test]
fn stop_mid_note_leaves_no_voices() {
    let track = MusicTrack::from_bytes("song", &song()).unwrap();
    let mut backend = OfflineBackend::manual();
    let mut scheduler = PlaybackScheduler::new(&PlayerConfig::default());
    scheduler.load(&mut backend, track.events.clone());
    scheduler.play(&mut backend, false);
    backend.advance(0.1);
    scheduler.tick(&mut backend);
    assert_eq!(scheduler.active_voices(), 1);

    backend.clear_calls();
    scheduler.stop(&mut backend);
    assert_eq!(scheduler.active_voices(), 0);
    assert!(matches!(
        backend.calls().as_slice(),
        [BackendCall::Kill { .. }]
    ));
    assert_eq!(backend.now(), 0.1);
}
