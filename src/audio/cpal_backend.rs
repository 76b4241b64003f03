use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info, warn};

use super::{AudioBackend, GainHandle, OscillatorHandle, VoiceHandle, Wave};
use crate::config::PlayerConfig;
use crate::error::BackendError;

const COMMAND_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub(crate) enum VoiceCommand {
    Start {
        id: u64,
        wave: Wave,
        frequency: f32,
        level: f32,
        at_frame: u64,
    },
    Stop {
        id: u64,
        at_frame: u64,
    },
    Kill {
        id: u64,
    },
    OutputGain {
        target: f32,
        time_constant: f64,
    },
}

/// Plays voices on the default cpal output device.
///
/// The clock is the number of frames the device has consumed, so it only
/// moves while the stream is running.
pub struct CpalBackend {
    _stream: cpal::Stream,
    producer: HeapProd<VoiceCommand>,
    frame_counter: Arc<AtomicU64>,
    sample_rate: f64,
    next_id: u64,
}

impl CpalBackend {
    pub fn open(config: &PlayerConfig) -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::DeviceUnavailable)?;
        let supported = device.default_output_config()?;

        let mut stream_config: cpal::StreamConfig = supported.into();
        if let Some(rate) = config.sample_rate {
            stream_config.sample_rate = rate;
        }
        let sample_rate = stream_config.sample_rate as f64;
        let channels = stream_config.channels as usize;
        info!("Audio output: {} channels, {} Hz", channels, sample_rate);

        let ring_buffer = HeapRb::<VoiceCommand>::new(COMMAND_QUEUE_CAPACITY);
        let (producer, consumer) = ring_buffer.split();
        let frame_counter = Arc::new(AtomicU64::new(0));

        let mut mixer = Mixer::new(sample_rate, channels, config.output_gain);
        let mut consumer: HeapCons<VoiceCommand> = consumer;
        let counter_audio = frame_counter.clone();

        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Some(command) = consumer.try_pop() {
                    mixer.apply(command);
                }
                let start = counter_audio.load(Ordering::Relaxed);
                let frames = mixer.render(data, start);
                counter_audio.fetch_add(frames as u64, Ordering::Relaxed);
            },
            |err| error!("Audio error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            producer,
            frame_counter,
            sample_rate,
            next_id: 0,
        })
    }

    fn to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    fn send(&mut self, command: VoiceCommand) {
        if self.producer.try_push(command).is_err() {
            warn!("audio command queue full, dropping {:?}", command);
        }
    }
}

impl AudioBackend for CpalBackend {
    fn now(&self) -> f64 {
        self.frame_counter.load(Ordering::Relaxed) as f64 / self.sample_rate
    }

    fn start_voice(&mut self, wave: Wave, frequency: f32, level: f32, at: f64) -> VoiceHandle {
        let id = self.next_id;
        self.next_id += 1;
        let at_frame = self.to_frame(at);
        self.send(VoiceCommand::Start {
            id,
            wave,
            frequency,
            level,
            at_frame,
        });
        // The renderer keeps oscillator and gain together, so both handles
        // name the same render voice.
        VoiceHandle {
            oscillator: OscillatorHandle(id),
            gain: GainHandle(id),
        }
    }

    fn stop_voice(&mut self, voice: VoiceHandle, at: f64) {
        let at_frame = self.to_frame(at);
        self.send(VoiceCommand::Stop {
            id: voice.oscillator.0,
            at_frame,
        });
    }

    fn kill_voice(&mut self, voice: VoiceHandle) {
        self.send(VoiceCommand::Kill {
            id: voice.oscillator.0,
        });
    }

    fn set_output_gain(&mut self, target: f32, time_constant: f64) {
        self.send(VoiceCommand::OutputGain {
            target,
            time_constant,
        });
    }
}

struct RenderVoice {
    id: u64,
    wave: Wave,
    phase: f32,
    phase_step: f32,
    level: f32,
    start_frame: u64,
    stop_frame: Option<u64>,
}

impl RenderVoice {
    fn is_sounding(&self, frame: u64) -> bool {
        frame >= self.start_frame && self.stop_frame.is_none_or(|stop| frame < stop)
    }
}

/// Output gain that follows its target exponentially, one step per frame.
struct SmoothedGain {
    value: f32,
    target: f32,
    coefficient: f32,
}

impl SmoothedGain {
    fn new(value: f32) -> Self {
        Self {
            value,
            target: value,
            coefficient: 1.0,
        }
    }

    fn set_target(&mut self, target: f32, time_constant: f64, sample_rate: f64) {
        self.target = target;
        self.coefficient = if time_constant <= 0.0 {
            1.0
        } else {
            (1.0 - (-1.0 / (time_constant * sample_rate)).exp()) as f32
        };
    }

    fn next(&mut self) -> f32 {
        self.value += (self.target - self.value) * self.coefficient;
        self.value
    }
}

/// Render-thread state: every live voice summed onto one mono bus, copied to
/// each output channel.
pub(crate) struct Mixer {
    voices: Vec<RenderVoice>,
    output_gain: SmoothedGain,
    sample_rate: f64,
    channels: usize,
}

impl Mixer {
    pub(crate) fn new(sample_rate: f64, channels: usize, output_gain: f32) -> Self {
        Self {
            voices: Vec::with_capacity(64),
            output_gain: SmoothedGain::new(output_gain),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub(crate) fn apply(&mut self, command: VoiceCommand) {
        match command {
            VoiceCommand::Start {
                id,
                wave,
                frequency,
                level,
                at_frame,
            } => self.voices.push(RenderVoice {
                id,
                wave,
                phase: 0.0,
                phase_step: (frequency as f64 / self.sample_rate) as f32,
                level,
                start_frame: at_frame,
                stop_frame: None,
            }),
            VoiceCommand::Stop { id, at_frame } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                    voice.stop_frame = Some(at_frame);
                }
            }
            VoiceCommand::Kill { id } => self.voices.retain(|v| v.id != id),
            VoiceCommand::OutputGain {
                target,
                time_constant,
            } => self
                .output_gain
                .set_target(target, time_constant, self.sample_rate),
        }
    }

    /// Renders interleaved frames starting at clock frame `start`, and
    /// returns how many frames were written.
    pub(crate) fn render(&mut self, data: &mut [f32], start: u64) -> usize {
        let num_frames = data.len() / self.channels;
        for (offset, frame) in data.chunks_exact_mut(self.channels).enumerate() {
            let clock = start + offset as u64;
            let mut sample = 0.0;
            for voice in &mut self.voices {
                if !voice.is_sounding(clock) {
                    continue;
                }
                sample += voice.wave.sample(voice.phase) * voice.level;
                voice.phase += voice.phase_step;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }
            let sample = sample * self.output_gain.next();
            frame.fill(sample);
        }

        let end = start + num_frames as u64;
        self.voices
            .retain(|v| v.stop_frame.is_none_or(|stop| stop > end));
        num_frames
    }

    #[cfg(test)]
    fn voice_count(&self) -> usize {
        self.voices.len()
    }
}
