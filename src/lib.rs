pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod library;
pub mod smf;
pub mod timing;
pub mod volume;

pub use config::PlayerConfig;
pub use engine::{MusicService, PlayerStatus};
pub use error::{BackendError, ConfigError, LibraryError, ParseError};
pub use library::{MusicLibrary, MusicTrack};
pub use timing::PlaybackState;
pub use volume::{VolumeProvider, VolumeSettings};
