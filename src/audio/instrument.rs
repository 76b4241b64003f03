use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    #[default]
    Square,
    Saw,
    Triangle,
}

impl Wave {
    /// One sample of the waveform at `phase` in `[0, 1)`, in `[-1, 1]`.
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Wave::Sine => (phase * 2.0 * std::f32::consts::PI).sin(),
            Wave::Square => {
                if phase < 0.5 {
                    -1.0
                } else {
                    1.0
                }
            }
            Wave::Saw => phase * 2.0 - 1.0,
            Wave::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waves_stay_in_range() {
        for wave in [Wave::Sine, Wave::Square, Wave::Saw, Wave::Triangle] {
            for i in 0..100 {
                let s = wave.sample(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&s), "{wave:?} at {i}: {s}");
            }
        }
    }

    #[test]
    fn square_flips_at_half_period() {
        assert_eq!(Wave::Square.sample(0.25), -1.0);
        assert_eq!(Wave::Square.sample(0.75), 1.0);
    }

    #[test]
    fn triangle_peaks_mid_period() {
        assert_eq!(Wave::Triangle.sample(0.5), 1.0);
        assert_eq!(Wave::Triangle.sample(0.0), -1.0);
    }
}
