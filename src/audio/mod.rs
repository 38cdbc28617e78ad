pub mod capture;
pub mod denoise;
pub mod processor;
pub mod stft;

#[cfg(feature = "microphone")]
pub use capture::record_clip;
pub use capture::{validate_duration, MicrophoneCapability};
pub use denoise::{reduce_noise, NoiseReductionConfig, NoiseReductionMode};
pub use processor::{
    decode_wav_bytes, downmix_to_mono, load_audio_file, preprocess, resample_to_16k, write_wav,
    Waveform, TARGET_SAMPLE_RATE,
};
