//! Uniformly partitioned overlap-save convolution
//!
//! The impulse response is cut into partitions of [`PARTITION_LEN`] samples
//! whose spectra are computed once, on the thread that installs the response.
//! While rendering, the input partition being filled is transformed
//! zero-padded on every call, so the output carries no added latency. Each
//! completed input partition is kept as a spectrum and folded into a running
//! tail sum, which makes the per-sample cost independent of the response
//! length apart from one spectral multiply-add pass per completed partition.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::types::Sample;

/// Partition length in samples; the FFT size is twice this
pub const PARTITION_LEN: usize = 256;

const FFT_LEN: usize = 2 * PARTITION_LEN;

type Bin = Complex<Sample>;

/// Stereo convolution of one input channel with a left/right response pair
pub(crate) struct PartitionedConvolver {
    response_len: usize,
    partitions: usize,
    bins: usize,
    forward: Arc<dyn RealToComplex<Sample>>,
    inverse: Arc<dyn ComplexToReal<Sample>>,
    /// Response partition spectra, `partitions * bins`, pre-scaled by 1/FFT_LEN
    filter_left: Vec<Bin>,
    filter_right: Vec<Bin>,
    /// Spectra of completed input partitions, a ring of `partitions` slots
    history: Vec<Bin>,
    newest: usize,
    /// Contribution of every completed partition to the one being filled
    tail_left: Vec<Bin>,
    tail_right: Vec<Bin>,
    /// Previous input partition followed by the one being filled
    window: Vec<Sample>,
    fill: usize,
    frame: Vec<Sample>,
    spectrum: Vec<Bin>,
    mix: Vec<Bin>,
    output: Vec<Sample>,
    scratch: Vec<Bin>,
}

impl PartitionedConvolver {
    /// Plan the transforms and pre-compute the response spectra
    ///
    /// Allocates; call off the audio thread.
    pub(crate) fn new(left: &[Sample], right: &[Sample]) -> Self {
        let response_len = left.len().max(right.len()).max(1);
        let partitions = response_len.div_ceil(PARTITION_LEN);

        let mut planner = RealFftPlanner::<Sample>::new();
        let forward = planner.plan_fft_forward(FFT_LEN);
        let inverse = planner.plan_fft_inverse(FFT_LEN);
        let bins = forward.complex_len();
        let scratch_len = forward
            .get_scratch_len()
            .max(inverse.get_scratch_len());

        let mut frame = vec![0.0; FFT_LEN];
        let mut scratch = vec![Bin::default(); scratch_len];
        let filter_left = response_spectra(&*forward, left, partitions, &mut frame, &mut scratch);
        let filter_right = response_spectra(&*forward, right, partitions, &mut frame, &mut scratch);

        Self {
            response_len,
            partitions,
            bins,
            forward,
            inverse,
            filter_left,
            filter_right,
            history: vec![Bin::default(); partitions * bins],
            newest: 0,
            tail_left: vec![Bin::default(); bins],
            tail_right: vec![Bin::default(); bins],
            window: vec![0.0; FFT_LEN],
            fill: 0,
            frame,
            spectrum: vec![Bin::default(); bins],
            mix: vec![Bin::default(); bins],
            output: vec![0.0; FFT_LEN],
            scratch,
        }
    }

    /// Length of the installed response in samples
    pub(crate) fn response_len(&self) -> usize {
        self.response_len
    }

    /// Convolve `input` into `left`/`right`
    ///
    /// Renders `left.len().min(right.len())` samples. Input past the end of
    /// `input` counts as silence. With `accumulate` the result is added onto
    /// the outputs, otherwise it replaces them.
    pub(crate) fn process(
        &mut self,
        input: &[Sample],
        left: &mut [Sample],
        right: &mut [Sample],
        accumulate: bool,
    ) {
        let n = left.len().min(right.len());
        let mut done = 0;

        while done < n {
            let chunk = (PARTITION_LEN - self.fill).min(n - done);
            let start = PARTITION_LEN + self.fill;

            for (i, slot) in self.window[start..start + chunk].iter_mut().enumerate() {
                *slot = input.get(done + i).copied().unwrap_or(0.0);
            }
            self.frame.copy_from_slice(&self.window);
            // Buffer lengths are fixed at construction, so the transform cannot fail
            let _ = self
                .forward
                .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch);

            let bins = self.bins;
            inverse_transform(
                &*self.inverse,
                &self.spectrum,
                &self.filter_left[..bins],
                &self.tail_left,
                &mut self.mix,
                &mut self.output,
                &mut self.scratch,
            );
            emit(
                &self.output[start..start + chunk],
                &mut left[done..done + chunk],
                accumulate,
            );

            inverse_transform(
                &*self.inverse,
                &self.spectrum,
                &self.filter_right[..bins],
                &self.tail_right,
                &mut self.mix,
                &mut self.output,
                &mut self.scratch,
            );
            emit(
                &self.output[start..start + chunk],
                &mut right[done..done + chunk],
                accumulate,
            );

            self.fill += chunk;
            done += chunk;
            if self.fill == PARTITION_LEN {
                self.complete_partition();
            }
        }
    }

    /// Push the full input partition into the history and rebuild the tail
    fn complete_partition(&mut self) {
        let bins = self.bins;

        if self.partitions > 1 {
            self.newest = (self.newest + 1) % self.partitions;
            let slot = self.newest * bins;
            self.history[slot..slot + bins].copy_from_slice(&self.spectrum);

            self.tail_left.fill(Bin::default());
            self.tail_right.fill(Bin::default());
            // Response partition k meets the input partition completed k-1 partitions ago
            for k in 1..self.partitions {
                let idx = (self.newest + self.partitions - (k - 1)) % self.partitions;
                let input = &self.history[idx * bins..(idx + 1) * bins];
                let h_left = &self.filter_left[k * bins..(k + 1) * bins];
                let h_right = &self.filter_right[k * bins..(k + 1) * bins];
                for i in 0..bins {
                    self.tail_left[i] += input[i] * h_left[i];
                    self.tail_right[i] += input[i] * h_right[i];
                }
            }
        }

        self.window.copy_within(PARTITION_LEN.., 0);
        self.window[PARTITION_LEN..].fill(0.0);
        self.fill = 0;
    }
}

/// Spectra of `response` cut into `partitions` zero-padded partitions
fn response_spectra(
    forward: &dyn RealToComplex<Sample>,
    response: &[Sample],
    partitions: usize,
    frame: &mut [Sample],
    scratch: &mut [Bin],
) -> Vec<Bin> {
    let bins = forward.complex_len();
    let scale = 1.0 / FFT_LEN as Sample;
    let mut spectra = vec![Bin::default(); partitions * bins];

    for (k, spectrum) in spectra.chunks_exact_mut(bins).enumerate() {
        frame.fill(0.0);
        let start = (k * PARTITION_LEN).min(response.len());
        let end = (start + PARTITION_LEN).min(response.len());
        frame[..end - start].copy_from_slice(&response[start..end]);

        let _ = forward.process_with_scratch(frame, spectrum, scratch);
        for bin in spectrum.iter_mut() {
            *bin *= scale;
        }
    }
    spectra
}

/// Multiply-add the current spectrum onto the tail and transform back
fn inverse_transform(
    inverse: &dyn ComplexToReal<Sample>,
    spectrum: &[Bin],
    head: &[Bin],
    tail: &[Bin],
    mix: &mut [Bin],
    output: &mut [Sample],
    scratch: &mut [Bin],
) {
    for (((m, &x), &h), &t) in mix.iter_mut().zip(spectrum).zip(head).zip(tail) {
        *m = x * h + t;
    }
    // DC and Nyquist bins of a real signal have no imaginary part
    if let Some(first) = mix.first_mut() {
        first.im = 0.0;
    }
    if let Some(last) = mix.last_mut() {
        last.im = 0.0;
    }
    let _ = inverse.process_with_scratch(mix, output, scratch);
}

#[inline]
fn emit(source: &[Sample], dest: &mut [Sample], accumulate: bool) {
    if accumulate {
        for (d, s) in dest.iter_mut().zip(source) {
            *d += *s;
        }
    } else {
        dest.copy_from_slice(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic decaying noise, `len` samples
    fn decaying_noise(len: usize, seed: u32) -> Vec<Sample> {
        let mut state = seed;
        (0..len)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let white = (state >> 8) as Sample / (1u32 << 24) as Sample - 0.5;
                white * (-(i as Sample) / (len as Sample / 4.0)).exp()
            })
            .collect()
    }

    fn direct(input: &[Sample], response: &[Sample]) -> Vec<Sample> {
        (0..input.len())
            .map(|t| {
                response
                    .iter()
                    .enumerate()
                    .take(t + 1)
                    .map(|(k, h)| h * input[t - k])
                    .sum::<Sample>()
            })
            .collect()
    }

    fn assert_close(actual: &[Sample], expected: &[Sample], tolerance: Sample) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).abs() <= tolerance,
                "sample {}: {} vs {}",
                i,
                a,
                e
            );
        }
    }

    #[test]
    fn test_impulse_reproduces_response() {
        let left = decaying_noise(700, 1);
        let right = decaying_noise(700, 2);
        let mut convolver = PartitionedConvolver::new(&left, &right);
        assert_eq!(convolver.response_len(), 700);
        assert_eq!(convolver.partitions, 3);

        let mut input = vec![0.0; 800];
        input[0] = 1.0;
        let mut out_l = vec![0.0; 800];
        let mut out_r = vec![0.0; 800];
        convolver.process(&input, &mut out_l, &mut out_r, false);

        assert_close(&out_l[..700], &left, 1e-5);
        assert_close(&out_r[..700], &right, 1e-5);
        assert!(out_l[700..].iter().all(|s| s.abs() < 1e-5));
    }

    #[test]
    fn test_matches_direct_form_across_uneven_blocks() {
        let response = decaying_noise(1500, 7);
        let input = decaying_noise(3000, 11);
        let expected = direct(&input, &response);

        let mut convolver = PartitionedConvolver::new(&response, &response);
        let mut out_l = vec![0.0; input.len()];
        let mut out_r = vec![0.0; input.len()];
        let mut offset = 0;
        for block in [1, 37, 256, 100, 512, 7, 1000].iter().cycle() {
            if offset >= input.len() {
                break;
            }
            let end = (offset + block).min(input.len());
            convolver.process(
                &input[offset..end],
                &mut out_l[offset..end],
                &mut out_r[offset..end],
                false,
            );
            offset = end;
        }

        assert_close(&out_l, &expected, 1e-4);
        assert_eq!(out_l, out_r);
    }

    #[test]
    fn test_accumulate_adds_onto_output() {
        let mut convolver = PartitionedConvolver::new(&[0.5], &[0.25]);
        let mut left = vec![1.0; 4];
        let mut right = vec![1.0; 4];
        convolver.process(&[1.0, 1.0, 1.0, 1.0], &mut left, &mut right, true);
        assert_close(&left, &[1.5; 4], 1e-6);
        assert_close(&right, &[1.25; 4], 1e-6);
    }

    #[test]
    fn test_short_input_is_zero_extended() {
        let mut convolver = PartitionedConvolver::new(&[1.0, 0.5], &[1.0, 0.5]);
        let mut left = vec![9.0; 4];
        let mut right = vec![9.0; 4];
        convolver.process(&[1.0], &mut left, &mut right, false);
        assert_close(&left, &[1.0, 0.5, 0.0, 0.0], 1e-6);
    }
}
