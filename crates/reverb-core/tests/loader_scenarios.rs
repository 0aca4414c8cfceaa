//! End-to-end loader and audio path scenarios
//!
//! Each test assembles a full `ReverbStage` around the convolution core and
//! drives it the way a host would: submit loads from the control side, render
//! blocks on the "audio" side, and watch the event queue.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use reverb_core::format::{write_binary_brir, BinaryBrirDecoder, HDF5_SIGNATURE};
use reverb_core::{
    db_to_gain, BFormatChannel, BrirDecoder, BrirLoadRequest, ConvolutionCore, FormatDecoders,
    LoadError, LoadEvent, LoadEvents, LoadResult, LoadState, ReverbConfig, ReverbEnvironment,
    ReverbStage, SpatialCore,
};

type Env = <ConvolutionCore as SpatialCore>::Environment;

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Fixtures
// ============================================================================

fn stage_with(dir: &Path, decoders: FormatDecoders<Env>) -> ReverbStage<ConvolutionCore> {
    let config = ReverbConfig {
        brir_directory: dir.to_path_buf(),
        level_db: 0.0,
        ..Default::default()
    };
    ReverbStage::new(Arc::new(ConvolutionCore::new(48000)), decoders, &config)
}

fn stage(dir: &Path) -> ReverbStage<ConvolutionCore> {
    stage_with(dir, FormatDecoders::default())
}

/// Write a BRIR whose W response is `w` on both ears
fn write_room(path: &Path, sample_rate: u32, w: &[f32]) {
    write_binary_brir(
        path,
        sample_rate,
        &[(w.to_vec(), w.to_vec()), (vec![0.5], vec![-0.5])],
    )
    .unwrap();
}

fn states(events: &mut LoadEvents) -> Vec<LoadState> {
    events.drain().iter().map(LoadEvent::state).collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Feed `input` into W and render one direct-decode block
fn render_direct(stage: &mut ReverbStage<ConvolutionCore>, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0; input.len()];
    let mut right = vec![0.0; input.len()];
    stage.processor.feed_encoded(BFormatChannel::W, input);
    stage
        .processor
        .process(&mut [&mut left[..], &mut right[..]]);
    (left, right)
}

fn is_silent(samples: &[f32]) -> bool {
    samples.iter().all(|s| *s == 0.0)
}

fn assert_same_output(actual: &(Vec<f32>, Vec<f32>), expected: &(Vec<f32>, Vec<f32>)) {
    for (a, e) in actual.0.iter().chain(&actual.1).zip(expected.0.iter().chain(&expected.1)) {
        assert!((a - e).abs() < 1e-6, "{:?} vs {:?}", actual, expected);
    }
}

/// Decoder that blocks in `decode_into` until the gate opens
#[derive(Clone)]
struct GatedDecoder {
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl GatedDecoder {
    fn new() -> Self {
        Self {
            gate: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn open(&self) {
        let (open, cvar) = &*self.gate;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl BrirDecoder<Env> for GatedDecoder {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn declared_sample_rate(&self, path: &Path) -> LoadResult<u32> {
        BrirDecoder::<Env>::declared_sample_rate(&BinaryBrirDecoder, path)
    }

    fn decode_into(&self, path: &Path, environment: &mut Env) -> LoadResult<()> {
        let (open, cvar) = &*self.gate;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cvar.wait(guard).unwrap();
        }
        drop(guard);
        BinaryBrirDecoder.decode_into(path, environment)
    }
}

/// Interchange decoder that only knows a file's declared rate
struct DeclaredRateDecoder(u32);

impl BrirDecoder<Env> for DeclaredRateDecoder {
    fn name(&self) -> &'static str {
        "declared-rate"
    }

    fn declared_sample_rate(&self, _path: &Path) -> LoadResult<u32> {
        Ok(self.0)
    }

    fn decode_into(&self, path: &Path, _environment: &mut Env) -> LoadResult<()> {
        Err(LoadError::DecodeFailure(format!("{:?}: not decodable", path)))
    }
}

fn write_interchange_stub(path: &Path) {
    let mut bytes = HDF5_SIGNATURE.to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    std::fs::write(path, bytes).unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn bundled_preset_loads_and_renders() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0, 0.5]);

    let mut stage = stage(dir.path());
    assert!(is_silent(&render_direct(&mut stage, &[1.0; 32]).0));

    assert!(stage.loader.setup(48000));
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert_eq!(
        states(&mut stage.events),
        vec![LoadState::Loading, LoadState::Loaded, LoadState::Idle]
    );
    assert_eq!(stage.loader.current_identity(), Some(preset));
    assert_eq!(stage.loader.identity_label(), "Small");

    let (left, right) = render_direct(&mut stage, &[1.0; 32]);
    assert!(!is_silent(&left));
    assert!(!is_silent(&right));
    assert!(stage.meter.power() > 0.0);
}

#[test]
fn interchange_rate_mismatch_keeps_current_brir() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0]);
    let sofa = dir.path().join("hall.sofa");
    write_interchange_stub(&sofa);

    let decoders = FormatDecoders::with_builtin().with_interchange(DeclaredRateDecoder(44100));
    let mut stage = stage_with(dir.path(), decoders);
    stage.loader.setup(48000);
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    stage.events.drain();

    let input: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
    let before = render_direct(&mut stage, &input);

    assert!(stage.loader.submit_load(BrirLoadRequest::new(&sofa)));
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert_eq!(
        states(&mut stage.events),
        vec![LoadState::Loading, LoadState::Failed, LoadState::Idle]
    );
    assert_eq!(
        stage.loader.last_error(),
        Some(LoadError::SampleRateMismatch {
            expected: 48000,
            found: 44100
        })
    );
    assert_eq!(stage.loader.current_identity(), Some(preset));
    assert_eq!(stage.loader.load_state(), LoadState::Failed);
    assert_same_output(&render_direct(&mut stage, &input), &before);
}

#[cfg(feature = "sofa")]
#[test]
fn sofa_rate_mismatch_with_builtin_decoders() {
    use reverb_core::format::{write_sofa_brir, SpeakerResponse};

    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0]);
    let speakers: Vec<SpeakerResponse> = [0.0, 90.0, 180.0, 270.0]
        .iter()
        .map(|&azimuth| SpeakerResponse {
            azimuth,
            elevation: 0.0,
            left: vec![0.5, 0.25],
            right: vec![0.5, 0.25],
        })
        .collect();
    let hall_44k = dir.path().join("hall_44k.sofa");
    write_sofa_brir(&hall_44k, 44100, &speakers).unwrap();
    let hall_48k = dir.path().join("hall_48k.sofa");
    write_sofa_brir(&hall_48k, 48000, &speakers).unwrap();

    let mut stage = stage(dir.path());
    stage.loader.setup(48000);
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    let input: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
    let before = render_direct(&mut stage, &input);

    assert!(stage.loader.submit_load(BrirLoadRequest::new(&hall_44k)));
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    assert_eq!(
        stage.loader.last_error(),
        Some(LoadError::SampleRateMismatch {
            expected: 48000,
            found: 44100
        })
    );
    assert_eq!(stage.loader.current_identity(), Some(preset));
    assert_same_output(&render_direct(&mut stage, &input), &before);

    // The same layout at the host rate loads and renders
    assert!(stage.loader.submit_load(BrirLoadRequest::new(&hall_48k)));
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    assert_eq!(stage.loader.last_error(), None);
    assert_eq!(stage.loader.current_identity(), Some(hall_48k));
    assert!(!is_silent(&render_direct(&mut stage, &[1.0; 16]).0));
}

#[cfg(not(feature = "sofa"))]
#[test]
fn interchange_without_decoder_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let sofa = dir.path().join("hall.sofa");
    write_interchange_stub(&sofa);

    let stage = stage(dir.path());
    assert!(stage.loader.submit_load(BrirLoadRequest::new(&sofa)));
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert!(matches!(
        stage.loader.last_error(),
        Some(LoadError::UnsupportedFormat(_))
    ));
    assert_eq!(stage.loader.current_identity(), None);
}

#[test]
fn disabled_stage_outputs_zeros() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0]);

    let mut stage = stage(dir.path());
    stage.loader.setup(48000);
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    stage.params.set_enabled(false);
    let (left, right) = render_direct(&mut stage, &[1.0; 16]);
    assert!(is_silent(&left) && is_silent(&right));

    let ones = vec![1.0; 16];
    let input: [&[f32]; 4] = [&ones, &ones, &ones, &ones];
    let mut left = vec![0.5; 16];
    let mut right = vec![0.5; 16];
    stage
        .processor
        .process_ambisonic(&input, &mut [&mut left[..], &mut right[..]]);
    assert!(is_silent(&left) && is_silent(&right));
    assert_eq!(stage.meter.power(), 0.0);
}

#[test]
fn ambisonic_impulse_matches_single_channel_decode() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[0.8, -0.4, 0.2, 0.1]);

    let mut stage = stage(dir.path());
    stage.params.set_level_db(-6.0);
    stage.loader.setup(48000);
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    let mut impulse = vec![0.0; 16];
    impulse[0] = 1.0;
    let silent = vec![0.0; 16];
    let input: [&[f32]; 4] = [&impulse, &silent, &silent, &silent];
    let mut left = vec![0.0; 16];
    let mut right = vec![0.0; 16];
    stage
        .processor
        .process_ambisonic(&input, &mut [&mut left[..], &mut right[..]]);

    // Reference: decode channel 0 alone through a freshly loaded environment
    let core = ConvolutionCore::new(48000);
    let mut reference = core.create_environment();
    BinaryBrirDecoder.decode_into(&preset, &mut reference).unwrap();
    let mut ref_left = vec![0.0; 16];
    let mut ref_right = vec![0.0; 16];
    reference.process_encoded_channel_reverb(
        BFormatChannel::W,
        &impulse,
        &mut ref_left,
        &mut ref_right,
    );

    let gain = db_to_gain(-6.0);
    for (out, expected) in left.iter().zip(&ref_left) {
        assert!((out - expected * gain).abs() < 1e-6);
    }
    for (out, expected) in right.iter().zip(&ref_right) {
        assert!((out - expected * gain).abs() < 1e-6);
    }
}

#[test]
fn burst_while_loading_honours_only_the_last_request() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = ["first", "second", "third", "fourth"]
        .iter()
        .map(|name| {
            let path = dir.path().join(format!("{}.3dti-brir", name));
            write_room(&path, 48000, &[1.0]);
            path
        })
        .collect();

    let gated = GatedDecoder::new();
    let mut stage = stage_with(dir.path(), FormatDecoders::empty().with_binary(gated.clone()));

    assert!(stage.loader.submit_load(BrirLoadRequest::new(&paths[0])));
    let mut seen = Vec::new();
    wait_until(|| {
        seen.extend(stage.events.drain());
        !seen.is_empty()
    });
    assert_eq!(
        seen,
        vec![LoadEvent::Started {
            source: paths[0].clone()
        }]
    );
    assert!(stage.loader.is_loading());
    assert_eq!(stage.loader.load_state(), LoadState::Loading);

    for path in &paths[1..] {
        assert!(stage.loader.submit_load(BrirLoadRequest::new(path)));
    }

    // Both entry points stay silent while the first load is in flight
    let (left, right) = render_direct(&mut stage, &[1.0; 16]);
    assert!(is_silent(&left) && is_silent(&right));
    let ones = vec![1.0; 16];
    let input: [&[f32]; 4] = [&ones, &ones, &ones, &ones];
    let mut left = vec![0.25; 16];
    let mut right = vec![0.25; 16];
    stage
        .processor
        .process_ambisonic(&input, &mut [&mut left[..], &mut right[..]]);
    assert!(is_silent(&left) && is_silent(&right));

    gated.open();
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert_eq!(
        stage.events.drain(),
        vec![
            LoadEvent::Loaded {
                source: paths[0].clone()
            },
            LoadEvent::Started {
                source: paths[3].clone()
            },
            LoadEvent::Loaded {
                source: paths[3].clone()
            },
            LoadEvent::Idle,
        ]
    );
    assert_eq!(stage.loader.current_identity(), Some(paths[3].clone()));
    assert!(!is_silent(&render_direct(&mut stage, &[1.0; 16]).0));
}

#[test]
fn resubmitting_current_brir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Medium_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0]);

    let mut stage = stage(dir.path());
    assert!(stage.loader.select_preset(1));
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    stage.events.drain();

    assert!(!stage.loader.select_preset(1));
    assert!(!stage.loader.submit_load(BrirLoadRequest::new(&preset)));
    assert!(stage.events.try_recv().is_none());
    assert_eq!(stage.loader.load_state(), LoadState::Loaded);
    assert!(!stage.loader.is_loading());
}

#[test]
fn corrupt_file_fails_without_touching_audio() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.3dti-brir");
    write_room(&good, 48000, &[1.0]);
    let corrupt = dir.path().join("corrupt.3dti-brir");
    write_room(&corrupt, 48000, &[1.0; 256]);
    let bytes = std::fs::read(&corrupt).unwrap();
    std::fs::write(&corrupt, &bytes[..bytes.len() / 2]).unwrap();

    let mut stage = stage(dir.path());
    stage.loader.submit_load(BrirLoadRequest::new(&good));
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert!(stage.loader.submit_load(BrirLoadRequest::new(&corrupt)));
    assert!(stage.loader.wait_for_idle(TIMEOUT));

    assert!(matches!(
        stage.loader.last_error(),
        Some(LoadError::DecodeFailure(_))
    ));
    assert_eq!(stage.loader.current_identity(), Some(good));
    assert!(stage.processor.environment().has_brir());
    assert!(!is_silent(&render_direct(&mut stage, &[1.0; 16]).0));
}

#[test]
fn block_larger_than_core_buffers_renders_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let preset = dir.path().join("3DTI_BRIR_Small_48000Hz.3dti-brir");
    write_room(&preset, 48000, &[1.0, 0.5]);

    let config = ReverbConfig {
        brir_directory: dir.path().to_path_buf(),
        level_db: 0.0,
        max_block_size: 4096,
        ..Default::default()
    };
    let mut stage = ReverbStage::new(
        Arc::new(ConvolutionCore::with_block_size(48000, 512)),
        FormatDecoders::default(),
        &config,
    );
    stage.loader.setup(48000);
    assert!(stage.loader.wait_for_idle(TIMEOUT));
    assert_eq!(stage.processor.max_block_size(), 512);

    // A 2048-frame ambisonic block is split to fit and rendered completely
    let w = vec![0.5; 2048];
    let silent = vec![0.0; 2048];
    let input: [&[f32]; 4] = [&w, &silent, &silent, &silent];
    let mut left = vec![0.0; 2048];
    let mut right = vec![0.0; 2048];
    stage
        .processor
        .process_ambisonic(&input, &mut [&mut left[..], &mut right[..]]);
    assert!((left[0] - 0.5).abs() < 1e-5);
    assert!(left[1..].iter().all(|s| (s - 0.75).abs() < 1e-5));

    // Direct decode reports how much of an oversized feed was kept
    assert_eq!(stage.processor.feed_encoded(BFormatChannel::W, &w), 512);
}

#[test]
fn dropping_the_loader_mid_load_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("room.3dti-brir");
    write_room(&path, 48000, &[1.0]);

    let gated = GatedDecoder::new();
    let stage = stage_with(dir.path(), FormatDecoders::empty().with_binary(gated.clone()));
    let ReverbStage { loader, .. } = stage;
    loader.submit_load(BrirLoadRequest::new(&path));

    let opener = {
        let gated = gated.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gated.open();
        })
    };
    drop(loader);
    opener.join().unwrap();
}
