//! Audio output via cpal

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use newsreel_audio::Renderer;

/// Largest callback we render without allocating (8192 stereo frames)
const SCRATCH_SAMPLES: usize = 16384;

/// A running output stream; audio stops when dropped
pub struct Output {
    _stream: cpal::Stream,
}

/// Query the default device's sample rate
pub fn default_sample_rate() -> anyhow::Result<u32> {
    let device = cpal::default_host()
        .default_output_device()
        .context("No audio output device found")?;
    let config = device
        .default_output_config()
        .context("Failed to get audio config")?;
    Ok(config.sample_rate().0)
}

/// Open the default output device and pull audio from `renderer`
pub fn start(renderer: Renderer) -> anyhow::Result<Output> {
    let device = cpal::default_host()
        .default_output_device()
        .context("No audio output device found")?;
    let config = device
        .default_output_config()
        .context("Failed to get audio config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let mut scratch = vec![0.0f32; SCRATCH_SAMPLES];

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if channels == 2 {
                    renderer.try_render(data);
                    return;
                }

                let frames = data.len() / channels.max(1);
                let Some(stereo) = scratch.get_mut(..frames * 2) else {
                    data.fill(0.0);
                    return;
                };
                renderer.try_render(stereo);
                for (frame, lr) in data.chunks_mut(channels).zip(stereo.chunks(2)) {
                    match frame.len() {
                        1 => frame[0] = (lr[0] + lr[1]) * 0.5,
                        _ => {
                            frame.fill(0.0);
                            frame[0] = lr[0];
                            frame[1] = lr[1];
                        }
                    }
                }
            },
            |err| tracing::error!(error = %err, "Audio stream error"),
            None,
        )
        .context("Failed to create audio stream")?;

    stream.play().context("Failed to start audio")?;
    tracing::debug!(sample_rate, channels, "Audio output started");

    Ok(Output { _stream: stream })
}
