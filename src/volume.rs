use std::sync::atomic::{AtomicU32, Ordering};

/// Source of the two user volume settings the player multiplies together.
pub trait VolumeProvider: Send + Sync {
    fn master(&self) -> f32;
    fn music(&self) -> f32;
}

/// Volume settings shared between the UI and the engine thread.
#[derive(Debug)]
pub struct VolumeSettings {
    master: AtomicU32,
    music: AtomicU32,
}

impl VolumeSettings {
    pub fn new(master: f32, music: f32) -> Self {
        Self {
            master: AtomicU32::new(master.clamp(0.0, 1.0).to_bits()),
            music: AtomicU32::new(music.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn set_master(&self, value: f32) {
        self.master
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_music(&self, value: f32) {
        self.music
            .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl VolumeProvider for VolumeSettings {
    fn master(&self) -> f32 {
        f32::from_bits(self.master.load(Ordering::Relaxed))
    }

    fn music(&self) -> f32 {
        f32::from_bits(self.music.load(Ordering::Relaxed))
    }
}
