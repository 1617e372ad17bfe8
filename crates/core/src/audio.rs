//! Telephony audio transcoding
//!
//! The call leg carries µ-law 8kHz mono; synthesis providers emit 16-bit
//! linear PCM at higher rates. These conversions run once per audio chunk,
//! so everything here is a pure function with at most one output allocation.

use crate::error::{Error, Result};

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

/// Encode one 16-bit linear PCM sample as G.711 µ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut s = sample as i32;
    let sign: u8 = if s < 0 {
        s = -s;
        0x80
    } else {
        0x00
    };
    if s > ULAW_CLIP {
        s = ULAW_CLIP;
    }
    s += ULAW_BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (s & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((s >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Decode one G.711 µ-law byte to a 16-bit linear PCM sample.
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let b = !byte;
    let sign = b & 0x80;
    let exponent = (b >> 4) & 0x07;
    let mantissa = (b & 0x0F) as i32;
    let mut sample = ((mantissa << 3) + ULAW_BIAS) << exponent;
    sample -= ULAW_BIAS;
    if sign != 0 {
        -sample as i16
    } else {
        sample as i16
    }
}

/// Encode a PCM buffer as µ-law.
pub fn pcm_to_ulaw(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| linear_to_ulaw(s)).collect()
}

/// Decode a µ-law buffer to PCM.
pub fn ulaw_to_pcm(ulaw: &[u8]) -> Vec<i16> {
    ulaw.iter().map(|&b| ulaw_to_linear(b)).collect()
}

/// Downsample PCM by an integer ratio, averaging each window.
///
/// `from_hz` must be an integer multiple of `to_hz` (24000 → 8000 for the
/// synthesis leg). Window averaging is enough anti-aliasing for speech on
/// a phone line.
pub fn downsample(pcm: &[i16], from_hz: u32, to_hz: u32) -> Result<Vec<i16>> {
    if to_hz == 0 || from_hz == 0 {
        return Err(Error::Audio("sample rates must be non-zero".into()));
    }
    if from_hz % to_hz != 0 {
        return Err(Error::Audio(format!(
            "downsample ratio {from_hz}/{to_hz} is not integral"
        )));
    }
    let step = (from_hz / to_hz) as usize;
    if step == 1 {
        return Ok(pcm.to_vec());
    }
    let mut out = Vec::with_capacity(pcm.len() / step + 1);
    for window in pcm.chunks(step) {
        let sum: i32 = window.iter().map(|&s| s as i32).sum();
        out.push((sum / window.len() as i32) as i16);
    }
    Ok(out)
}

/// Interpret little-endian bytes as 16-bit PCM samples. A trailing odd
/// byte is dropped.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Full synthesis-leg conversion: 16-bit PCM bytes at `source_hz` down to
/// µ-law 8kHz ready for the media stream.
pub fn pcm_bytes_to_ulaw_8k(bytes: &[u8], source_hz: u32) -> Result<Vec<u8>> {
    let pcm = bytes_to_pcm(bytes);
    let pcm_8k = downsample(&pcm, source_hz, 8_000)?;
    Ok(pcm_to_ulaw(&pcm_8k))
}
