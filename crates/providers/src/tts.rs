//! ElevenLabs-style text-to-speech client
//!
//! Synthesis arrives as 16-bit PCM at 24kHz; the media stream wants µ-law
//! 8kHz. Streaming responses chunk at arbitrary byte boundaries, so a
//! small transcoder carries partial frames between chunks instead of
//! mangling the sample that straddles them.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use leadline_core::audio::pcm_bytes_to_ulaw_8k;
use leadline_core::{AudioChunkStream, Error, Result, TextToSpeech};

use crate::retry::{classify_reqwest, classify_status};

const PROVIDER: &str = "tts";
const BASE_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const MODEL_ID: &str = "eleven_turbo_v2_5";
const SOURCE_HZ: u32 = 24_000;

/// Converts a byte stream of 16-bit PCM at `source_hz` into µ-law 8kHz,
/// tolerating chunk boundaries that split samples or downsample windows.
struct ChunkTranscoder {
    source_hz: u32,
    /// Bytes per downsample window (one output sample).
    frame_bytes: usize,
    carry: Vec<u8>,
}

impl ChunkTranscoder {
    fn new(source_hz: u32) -> Result<Self> {
        if source_hz == 0 || source_hz % 8_000 != 0 {
            return Err(Error::Audio(format!(
                "unsupported synthesis rate {source_hz}"
            )));
        }
        Ok(Self {
            source_hz,
            frame_bytes: 2 * (source_hz / 8_000) as usize,
            carry: Vec::new(),
        })
    }

    /// Transcode as much of `bytes` as forms whole frames; the remainder
    /// is carried into the next call. May return an empty buffer.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.carry.extend_from_slice(bytes);
        let usable = self.carry.len() - self.carry.len() % self.frame_bytes;
        if usable == 0 {
            return Ok(Vec::new());
        }
        let rest = self.carry.split_off(usable);
        let whole = std::mem::replace(&mut self.carry, rest);
        pcm_bytes_to_ulaw_8k(&whole, self.source_hz)
    }
}

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
}

impl ElevenLabsTts {
    pub fn new(client: reqwest::Client, api_key: String, voice_id: String) -> Self {
        Self {
            client,
            api_key,
            voice_id,
        }
    }

    fn request(&self, path_suffix: &str, text: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!(
                "{BASE_URL}/{}{path_suffix}?output_format=pcm_24000",
                self.voice_id
            ))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": MODEL_ID,
                "voice_settings": {"stability": 0.5, "similarity_boost": 0.75},
            }))
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .request("", text)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &body));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;
        debug!(chars = text.len(), pcm_bytes = pcm.len(), "synthesized");
        pcm_bytes_to_ulaw_8k(&pcm, SOURCE_HZ)
    }

    async fn stream(&self, text: &str) -> Result<AudioChunkStream> {
        let response = self
            .request("/stream", text)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &body));
        }

        let mut transcoder = ChunkTranscoder::new(SOURCE_HZ)?;
        let mut body = response.bytes_stream();

        let stream = try_stream! {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| classify_reqwest(PROVIDER, e))?;
                let ulaw = transcoder.push(&chunk)?;
                if !ulaw.is_empty() {
                    yield ulaw;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn voice_name(&self) -> &str {
        &self.voice_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadline_core::audio::ulaw_to_linear;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn transcoder_handles_split_frames() {
        // Six 24kHz samples form two 8kHz output samples; feed them in
        // chunks that split both a sample and a window.
        let bytes = pcm_bytes(&[1000, 1000, 1000, -2000, -2000, -2000]);
        let mut transcoder = ChunkTranscoder::new(24_000).unwrap();

        let mut out = Vec::new();
        out.extend(transcoder.push(&bytes[..5]).unwrap());
        out.extend(transcoder.push(&bytes[5..7]).unwrap());
        out.extend(transcoder.push(&bytes[7..]).unwrap());

        assert_eq!(out.len(), 2);
        assert!((ulaw_to_linear(out[0]) as i32 - 1000).abs() <= 64);
        assert!((ulaw_to_linear(out[1]) as i32 + 2000).abs() <= 128);
    }

    #[test]
    fn transcoder_output_matches_single_shot() {
        let samples: Vec<i16> = (0..240).map(|i| (i * 100 % 8000) as i16).collect();
        let bytes = pcm_bytes(&samples);

        let single = pcm_bytes_to_ulaw_8k(&bytes, 24_000).unwrap();

        let mut transcoder = ChunkTranscoder::new(24_000).unwrap();
        let mut chunked = Vec::new();
        for chunk in bytes.chunks(7) {
            chunked.extend(transcoder.push(chunk).unwrap());
        }
        assert_eq!(single, chunked);
    }

    #[test]
    fn transcoder_rejects_unsupported_rates() {
        assert!(ChunkTranscoder::new(44_100).is_err());
        assert!(ChunkTranscoder::new(0).is_err());
    }
}
