use thiserror::Error;

/// Failures while decoding a Standard MIDI File.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid header: expected \"MThd\", found {found:?}")]
    InvalidHeader { found: String },

    #[error("unsupported time division {0:#06x}")]
    UnsupportedDivision(u16),

    #[error("stream truncated at byte {offset}: needed {needed} byte(s), {available} left")]
    TruncatedStream {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("data byte {byte:#04x} at byte {offset} with no running status")]
    UnexpectedDataByte { offset: usize, byte: u8 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to write config: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {key}: {source}")]
    Parse {
        key: String,
        #[source]
        source: ParseError,
    },
}

/// Failures acquiring or driving the audio device.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no audio output device available")]
    DeviceUnavailable,

    #[error("failed to query output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}
