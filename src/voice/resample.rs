//! Sample-rate conversion

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Resample mono audio from `from_rate` to `to_rate`
///
/// Input is zero-padded to whole chunks and the filter delay is removed,
/// so the output lines up with the input and keeps its tail.
///
/// # Errors
///
/// Returns [`Error::Audio`] if the resampler cannot be built or fails
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let delay = resampler.output_delay();
    let chunk_size = resampler.input_frames_next();
    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    // One extra silent chunk flushes the filter delay
    let padded_len = (samples.len() / chunk_size + 2) * chunk_size;
    let mut input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    input.resize(padded_len, 0.0);

    for chunk in input.chunks(chunk_size) {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
        if output.len() >= expected + delay {
            break;
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn downsampling_halves_length() {
        let samples = vec![0.0; 48000];
        let out = resample(&samples, 48000, 16000).unwrap();
        assert_eq!(out.len(), 16000);
    }

    #[test]
    fn short_input_is_not_dropped() {
        let samples = vec![0.25; 300];
        let out = resample(&samples, 32000, 16000).unwrap();
        assert_eq!(out.len(), 150);
    }
}
