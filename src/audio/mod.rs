mod backend;
mod cpal_backend;
mod instrument;
mod voice;

pub use backend::{
    AudioBackend, BackendCall, GainHandle, OfflineBackend, OscillatorHandle, VoiceHandle,
};
pub use cpal_backend::CpalBackend;
pub use instrument::Wave;
pub use voice::{Voice, VoiceManager};

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
