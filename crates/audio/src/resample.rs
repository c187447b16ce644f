//! Resampling of mono audio to the pipeline rate.
//!
//! The sinc filter runs over fixed 8192-frame chunks with a partial call
//! for the tail, then flushes with zeros until its delay line is drained;
//! the startup delay is dropped from the front of the output so slicing
//! by milliseconds stays aligned with the source audio.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::{AudioError, SAMPLE_RATE};

const CHUNK_FRAMES: usize = 8192;

pub(crate) fn resample_to_16k(audio: &[f32], src_rate: u32) -> Result<Vec<f32>, AudioError> {
    if src_rate == SAMPLE_RATE {
        return Ok(audio.to_vec());
    }
    let ratio = SAMPLE_RATE as f64 / src_rate as f64;
    let err = |e: &dyn std::fmt::Display| AudioError::Resample(e.to_string());

    // Speech content stops well below the 8 kHz Nyquist limit; a
    // medium-length sinc with cubic interpolation is enough here.
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.93,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::Blackman2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1).map_err(|e| err(&e))?;

    let expected = (audio.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut resampled: Vec<f32> = Vec::with_capacity(expected + delay);

    let mut chunks = audio.chunks_exact(CHUNK_FRAMES);
    for chunk in chunks.by_ref() {
        let mut out = resampler.process(&[chunk], None).map_err(|e| err(&e))?;
        resampled.append(&mut out[0]);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut out = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(|e| err(&e))?;
        resampled.append(&mut out[0]);
    }

    // Flush: zero input until the delayed frames have all come out.
    while resampled.len() < delay + expected {
        let mut out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| err(&e))?;
        if out[0].is_empty() {
            break;
        }
        resampled.append(&mut out[0]);
    }

    resampled.drain(..delay.min(resampled.len()));
    resampled.truncate(expected);
    Ok(resampled)
}
