//! Track source backed by the media library

use newsreel_audio::{DecodedAudio, TrackSource};
use newsreel_library::{extension_of, fetch_bytes, HttpClient, TrackLoader};

/// Fetches tracks from disk or HTTP and decodes them at the output rate
pub struct LoaderSource {
    loader: TrackLoader,
    http: HttpClient,
}

impl LoaderSource {
    pub fn new(sample_rate: u32, http: HttpClient) -> Self {
        Self {
            loader: TrackLoader::with_sample_rate(sample_rate),
            http,
        }
    }
}

impl TrackSource for LoaderSource {
    fn load(&self, url: &str) -> Result<DecodedAudio, Box<dyn std::error::Error + Send + Sync>> {
        let bytes = fetch_bytes(url, &self.http)?;
        let audio = self.loader.decode(bytes, extension_of(url))?;
        tracing::debug!(url, secs = audio.duration_secs, "Loaded track");
        Ok(DecodedAudio::new(audio.samples, audio.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_wav(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_loads_local_file_as_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, mono_wav(8000, &[0, 8192, 16384, 0])).unwrap();

        let source = LoaderSource::new(8000, HttpClient::new().unwrap());
        let audio = source.load(path.to_str().unwrap()).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.frames(), 4);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = LoaderSource::new(48000, HttpClient::new().unwrap());
        assert!(source.load("/no/such/track.mp3").is_err());
    }
}
