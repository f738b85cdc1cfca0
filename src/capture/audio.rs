//! Countdown tone feedback.
//!
//! The output device is opened lazily on the first beep, on a dedicated thread that owns the
//! stream for the rest of the process. If the device cannot be opened every later request is
//! a no-op; audio is never required for the capture flow.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

const ATTACK_SECS: f32 = 0.010;
const PEAK_GAIN: f32 = 0.3;
const FLOOR_GAIN: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration_ms: u64,
}

impl Tone {
    pub const fn new(frequency_hz: f32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    fn duration_secs(self) -> f32 {
        self.duration_ms as f32 / 1_000.0
    }
}

/// Fire-and-forget tone sink. Implementations must not block the caller.
pub trait ToneOutput: Send + Sync {
    fn beep(&self, tone: Tone);
}

/// Tone sink for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentTones;

impl ToneOutput for SilentTones {
    fn beep(&self, tone: Tone) {
        log::debug!(
            "audio_feedback: muted beep {}Hz {}ms",
            tone.frequency_hz,
            tone.duration_ms
        );
    }
}

/// Gain envelope of a beep at `elapsed` seconds: 10 ms linear attack from silence, then an
/// exponential decay that reaches near-silence at `duration`.
pub fn tone_gain(elapsed: f32, duration: f32) -> f32 {
    if !(elapsed >= 0.0 && elapsed < duration) {
        return 0.0;
    }

    let attack = ATTACK_SECS.min(duration);
    if elapsed < attack {
        return PEAK_GAIN * elapsed / attack;
    }

    let decay_span = duration - attack;
    if decay_span <= f32::EPSILON {
        return PEAK_GAIN;
    }
    let progress = ((elapsed - attack) / decay_span).clamp(0.0, 1.0);
    PEAK_GAIN * (FLOOR_GAIN / PEAK_GAIN).powf(progress)
}

/// One playing beep, rendered sample by sample.
#[derive(Debug, Clone)]
struct Voice {
    frequency_hz: f32,
    sample_rate: f32,
    duration: f32,
    total_samples: u64,
    index: u64,
}

impl Voice {
    fn new(tone: Tone, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let duration = tone.duration_secs();
        Self {
            frequency_hz: tone.frequency_hz,
            sample_rate,
            duration,
            total_samples: (duration * sample_rate).round() as u64,
            index: 0,
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.index >= self.total_samples {
            return None;
        }
        let t = self.index as f32 / self.sample_rate;
        self.index += 1;
        let phase = std::f32::consts::TAU * self.frequency_hz * t;
        Some(phase.sin() * tone_gain(t, self.duration))
    }
}

type SharedVoice = Arc<Mutex<Option<Voice>>>;

/// Fills one output buffer, emitting silence once the current voice has finished.
fn render_voice(voice: &SharedVoice, frames: usize, mut write: impl FnMut(usize, f32)) {
    let mut guard = match voice.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    for frame in 0..frames {
        let value = match guard.as_mut().and_then(Voice::next_sample) {
            Some(value) => value,
            None => {
                *guard = None;
                0.0
            }
        };
        write(frame, value);
    }
}

#[cfg(feature = "audio")]
mod device {
    use std::sync::{Arc, Mutex};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, StreamConfig};

    use super::{render_voice, SharedVoice, Tone, Voice};
    use crate::error::AudioError;

    pub(super) struct ToneStream {
        stream: cpal::Stream,
        voice: SharedVoice,
        sample_rate: u32,
    }

    impl ToneStream {
        pub(super) fn open() -> Result<Self, AudioError> {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
            let supported = device
                .default_output_config()
                .map_err(|err| AudioError::Config(err.to_string()))?;
            let sample_format = supported.sample_format();
            let config: StreamConfig = supported.into();
            let sample_rate = config.sample_rate.0;
            let voice: SharedVoice = Arc::new(Mutex::new(None));

            let stream = match sample_format {
                SampleFormat::F32 => build_stream::<f32>(&device, &config, voice.clone())?,
                SampleFormat::I16 => build_stream::<i16>(&device, &config, voice.clone())?,
                SampleFormat::U16 => build_stream::<u16>(&device, &config, voice.clone())?,
                other => return Err(AudioError::SampleFormat(format!("{other:?}"))),
            };

            Ok(Self {
                stream,
                voice,
                sample_rate,
            })
        }

        pub(super) fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        pub(super) fn play(&self, tone: Tone) -> Result<(), AudioError> {
            {
                let mut guard = match self.voice.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *guard = Some(Voice::new(tone, self.sample_rate));
            }
            // Resumes the stream if the host suspended it.
            self.stream
                .play()
                .map_err(|err| AudioError::Play(err.to_string()))
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        voice: SharedVoice,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = usize::from(config.channels).max(1);
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    render_voice(&voice, frames, |frame, value| {
                        let sample = <T as cpal::Sample>::from_sample(value);
                        let start = frame * channels;
                        for out in &mut data[start..start + channels] {
                            *out = sample;
                        }
                    });
                },
                |err| log::warn!("audio_feedback: stream error: {err}"),
                None,
            )
            .map_err(|err| AudioError::Build(err.to_string()))
    }
}

#[cfg(not(feature = "audio"))]
mod device {
    use super::Tone;
    use crate::error::AudioError;

    pub(super) struct ToneStream;

    impl ToneStream {
        pub(super) fn open() -> Result<Self, AudioError> {
            Err(AudioError::Unsupported)
        }

        pub(super) fn sample_rate(&self) -> u32 {
            0
        }

        pub(super) fn play(&self, _tone: Tone) -> Result<(), AudioError> {
            Ok(())
        }
    }
}

type OpenStream = fn() -> Result<device::ToneStream, AudioError>;

/// Lazily started tone output backed by the default audio device.
pub struct AudioFeedback {
    sender: Mutex<Option<mpsc::Sender<Tone>>>,
    unavailable: Arc<AtomicBool>,
    open: OpenStream,
}

impl AudioFeedback {
    #[must_use]
    pub fn new() -> Self {
        Self::with_opener(device::ToneStream::open)
    }

    fn with_opener(open: OpenStream) -> Self {
        Self {
            sender: Mutex::new(None),
            unavailable: Arc::new(AtomicBool::new(false)),
            open,
        }
    }

    /// False once opening the device has failed; stays false for the process lifetime.
    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Relaxed)
    }

    fn output(&self) -> Option<mpsc::Sender<Tone>> {
        let mut guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sender) = guard.as_ref() {
            return Some(sender.clone());
        }

        let (tx, rx) = mpsc::channel::<Tone>();
        let unavailable = Arc::clone(&self.unavailable);
        let open = self.open;
        let spawned = std::thread::Builder::new()
            .name("iris-tone-output".to_string())
            .spawn(move || run_tone_thread(open, rx, unavailable));

        match spawned {
            Ok(_) => {
                *guard = Some(tx.clone());
                Some(tx)
            }
            Err(err) => {
                log::warn!("audio_feedback: failed to spawn tone thread: {err}");
                self.unavailable.store(true, Ordering::Relaxed);
                None
            }
        }
    }
}

impl Default for AudioFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneOutput for AudioFeedback {
    fn beep(&self, tone: Tone) {
        if !self.is_available() {
            return;
        }
        let Some(sender) = self.output() else {
            return;
        };
        if sender.send(tone).is_err() {
            self.unavailable.store(true, Ordering::Relaxed);
        }
    }
}

fn run_tone_thread(open: OpenStream, rx: mpsc::Receiver<Tone>, unavailable: Arc<AtomicBool>) {
    let stream = match open() {
        Ok(stream) => stream,
        Err(err) => {
            log::warn!("audio_feedback: tone output unavailable, continuing silently: {err}");
            unavailable.store(true, Ordering::Relaxed);
            return;
        }
    };
    log::info!(
        "audio_feedback: output ready sample_rate={}",
        stream.sample_rate()
    );

    while let Ok(tone) = rx.recv() {
        if let Err(err) = stream.play(tone) {
            log::warn!("audio_feedback: beep failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_starts_silent_and_ramps_linearly() {
        assert_eq!(tone_gain(0.0, 0.1), 0.0);
        assert!((tone_gain(0.005, 0.1) - PEAK_GAIN / 2.0).abs() < 1e-6);
        assert!((tone_gain(0.010, 0.1) - PEAK_GAIN).abs() < 1e-6);
    }

    #[test]
    fn envelope_decays_to_near_silence_and_stops() {
        let mut previous = tone_gain(0.010, 0.2);
        let mut t = 0.02;
        while t < 0.2 {
            let gain = tone_gain(t, 0.2);
            assert!(gain < previous);
            previous = gain;
            t += 0.01;
        }
        assert!(tone_gain(0.1999, 0.2) < 0.0015);
        assert_eq!(tone_gain(0.2, 0.2), 0.0);
        assert_eq!(tone_gain(-0.1, 0.2), 0.0);
    }

    #[test]
    fn voice_renders_exactly_its_duration() {
        let mut voice = Voice::new(Tone::new(440.0, 100), 48_000);
        let mut rendered = 0;
        while voice.next_sample().is_some() {
            rendered += 1;
        }
        assert_eq!(rendered, 4_800);
    }

    #[test]
    fn render_voice_pads_with_silence_after_the_tone() {
        let voice: SharedVoice =
            Arc::new(Mutex::new(Some(Voice::new(Tone::new(880.0, 1), 8_000))));
        let mut out = vec![1.0f32; 16];
        render_voice(&voice, out.len(), |frame, value| out[frame] = value);

        assert!(out[8..].iter().all(|value| *value == 0.0));
        assert!(voice.lock().map(|guard| guard.is_none()).unwrap_or(false));
    }

    #[test]
    fn missing_device_turns_beeps_into_no_ops() {
        let feedback = AudioFeedback::with_opener(|| Err(AudioError::NoDevice));
        assert!(feedback.is_available());

        let started = std::time::Instant::now();
        for _ in 0..5 {
            feedback.beep(Tone::new(440.0, 100));
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(500));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while feedback.is_available() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(!feedback.is_available());

        let started = std::time::Instant::now();
        for _ in 0..100 {
            feedback.beep(Tone::new(880.0, 200));
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert!(!feedback.is_available());
    }

    #[test]
    fn silent_tones_accept_requests() {
        SilentTones.beep(Tone::new(440.0, 100));
    }
}
