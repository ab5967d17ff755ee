use std::io::{Cursor, Write};
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),
    #[error("ffmpeg not found; it is required for formats other than WAV and FLAC")]
    FfmpegNotFound,
    #[error("ffmpeg decode error: {0}")]
    Ffmpeg(String),
    #[error("Audio contains no samples")]
    Empty,
    #[error("Invalid stream parameters: {0}")]
    InvalidStream(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono PCM audio normalized to [-1.0, 1.0].
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode in-memory audio. WAV and FLAC are sniffed from their magic bytes
/// and decoded natively; anything else goes through ffmpeg.
pub fn decode_audio(bytes: &[u8], format_hint: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    let audio = if bytes.starts_with(b"RIFF") || bytes.starts_with(b"RIFX") {
        decode_wav(bytes)?
    } else if bytes.starts_with(b"fLaC") {
        decode_flac(bytes)?
    } else {
        decode_via_ffmpeg(bytes, format_hint)?
    };

    if audio.samples.is_empty() {
        return Err(DecodeError::Empty);
    }
    if audio.sample_rate == 0 {
        return Err(DecodeError::InvalidStream("sample rate is 0".into()));
    }
    Ok(audio)
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32)?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };
    Ok(DecodedAudio {
        samples: downmix(&interleaved, spec.channels as usize)?,
        sample_rate: spec.sample_rate,
    })
}

fn decode_flac(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let mut reader = claxon::FlacReader::new(Cursor::new(bytes))?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample)?;
    let interleaved: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<std::result::Result<_, _>>()?;
    Ok(DecodedAudio {
        samples: downmix(&interleaved, info.channels as usize)?,
        sample_rate: info.sample_rate,
    })
}

/// Full-scale value for signed integer samples of the given width.
fn int_scale(bits_per_sample: u32) -> Result<f32, DecodeError> {
    if !(1..=32).contains(&bits_per_sample) {
        return Err(DecodeError::InvalidStream(format!(
            "{bits_per_sample} bits per sample"
        )));
    }
    Ok((1u64 << (bits_per_sample - 1)) as f32)
}

/// Average interleaved channels into one.
fn downmix(interleaved: &[f32], channels: usize) -> Result<Vec<f32>, DecodeError> {
    match channels {
        0 => Err(DecodeError::InvalidStream("0 channels".into())),
        1 => Ok(interleaved.to_vec()),
        n => Ok(interleaved
            .chunks_exact(n)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect()),
    }
}

/// Decode an arbitrary container by converting it to 16-bit WAV with ffmpeg.
/// Both staging files are removed when they drop, on success or failure.
fn decode_via_ffmpeg(bytes: &[u8], format_hint: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    if Command::new("ffmpeg").arg("-version").output().is_err() {
        return Err(DecodeError::FfmpegNotFound);
    }

    let input_suffix = format_hint
        .map(|ext| format!(".{}", ext.trim_start_matches('.')))
        .unwrap_or_default();
    let mut input = tempfile::Builder::new()
        .prefix("lashir_in_")
        .suffix(&input_suffix)
        .tempfile()?;
    input.write_all(bytes)?;
    input.flush()?;

    let output = tempfile::Builder::new()
        .prefix("lashir_out_")
        .suffix(".wav")
        .tempfile()?;

    let result = Command::new("ffmpeg")
        .args([
            "-loglevel",
            "error",
            "-i",
            &input.path().to_string_lossy(),
            "-f",
            "wav",
            "-acodec",
            "pcm_s16le",
            "-y",
            &output.path().to_string_lossy(),
        ])
        .output()?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(DecodeError::Ffmpeg(stderr.trim().to_string()));
    }

    let wav = std::fs::read(output.path())?;
    decode_wav(&wav)
}

/// Encode mono f32 samples as a 16-bit WAV in memory.
#[cfg(test)]
pub(crate) fn encode_wav_i16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
        for s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    buf.into_inner()
}
