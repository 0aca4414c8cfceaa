//! Background BRIR loader
//!
//! Loads happen on a single on-demand worker thread so the audio thread never
//! touches the filesystem:
//!
//! ```text
//! control thread                loader thread                audio thread
//! ──────────────                ─────────────                ────────────
//! submit_load(req) ──▶ pending
//!   (spawn worker if idle)      take pending
//!                               is_loading = true  ───────▶  silence
//!                               sniff / check rate / decode
//!                               publish(env)
//!                               is_loading = false ───────▶  adopt env
//!                               next pending, or exit
//! ```
//!
//! At most one request waits in the queue. A newer submission replaces the
//! waiting one; the request already being decoded always runs to completion.
//! Failed attempts leave the current environment and identity untouched.

mod events;
mod handoff;

pub use events::{LoadEvent, LoadEvents, EVENT_QUEUE_CAPACITY};

pub(crate) use events::event_channel;
pub(crate) use handoff::EnvironmentHandoff;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{LoadError, LoadResult};
use crate::format::{BrirFormat, FormatDecoders};
use crate::gc::owned;
use crate::params::ReverbParameters;
use crate::spatial::{ReverbEnvironment, SpatialCore};
use crate::types::ReverberationOrder;

/// Loader state as seen by a UI
///
/// The outcome of the last attempt stays visible after the worker exits;
/// [`LoadEvent::Idle`] tells a UI that the queue drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoadState {
    /// No attempt has been made yet
    #[default]
    Idle = 0,
    /// An attempt is in progress; the audio path is silent
    Loading = 1,
    /// The last attempt succeeded
    Loaded = 2,
    /// The last attempt failed
    Failed = 3,
}

impl LoadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadState::Loading,
            2 => LoadState::Loaded,
            3 => LoadState::Failed,
            _ => LoadState::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoadState::Idle => "Idle",
            LoadState::Loading => "Loading",
            LoadState::Loaded => "Loaded",
            LoadState::Failed => "Failed",
        }
    }
}

/// A request to replace the current BRIR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrirLoadRequest {
    /// File to load; also the identity used for de-duplication
    pub source: PathBuf,
    /// Container format; sniffed from the file when `None`
    pub format: Option<BrirFormat>,
}

impl BrirLoadRequest {
    /// Request for `source` with the format sniffed on the loader thread
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            format: None,
        }
    }

    /// Force the container format instead of sniffing it
    pub fn with_format(mut self, format: BrirFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Pending-request slot and worker bookkeeping
#[derive(Default)]
struct LoadQueue {
    pending: Option<BrirLoadRequest>,
    worker_active: bool,
    worker: Option<JoinHandle<()>>,
}

/// State shared between the control handle and the worker thread
struct LoaderShared<C: SpatialCore> {
    core: Arc<C>,
    decoders: FormatDecoders<C::Environment>,
    order: ReverberationOrder,
    handoff: Arc<EnvironmentHandoff<C::Environment>>,
    queue: Mutex<LoadQueue>,
    /// Signalled when the worker exits
    idle: Condvar,
    state: AtomicU8,
    identity: Mutex<Option<PathBuf>>,
    last_error: Mutex<Option<LoadError>>,
    events: Mutex<rtrb::Producer<LoadEvent>>,
    shutdown: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: SpatialCore> LoaderShared<C> {
    fn set_state(&self, state: LoadState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn push_event(&self, event: LoadEvent) {
        if let Err(rtrb::PushError::Full(event)) = lock(&self.events).push(event) {
            log::warn!("[LOADER] Event queue full, dropping {:?}", event.state());
        }
    }

    /// Take the next request, or mark the worker stopped if there is none
    fn next_request(&self) -> Option<BrirLoadRequest> {
        let mut queue = lock(&self.queue);
        if self.shutdown.load(Ordering::Acquire) {
            queue.pending = None;
        }
        let next = queue.pending.take();
        if next.is_none() {
            queue.worker_active = false;
            self.push_event(LoadEvent::Idle);
            self.idle.notify_all();
        }
        next
    }

    fn attempt(&self, request: BrirLoadRequest) {
        let source = request.source.clone();
        let started = Instant::now();

        self.set_state(LoadState::Loading);
        self.handoff.begin_load();
        *lock(&self.last_error) = None;
        self.push_event(LoadEvent::Started {
            source: source.clone(),
        });
        log::info!("[LOADER] Loading BRIR {:?}", source);

        match self.build_environment(&request) {
            Ok(environment) => {
                self.handoff.publish(owned(environment));
                *lock(&self.identity) = Some(source.clone());
                self.handoff.end_load();
                self.set_state(LoadState::Loaded);
                log::info!(
                    "[LOADER] Loaded BRIR {:?} in {:.1}ms",
                    source,
                    started.elapsed().as_secs_f64() * 1000.0
                );
                self.push_event(LoadEvent::Loaded { source });
            }
            Err(error) => {
                match &error {
                    LoadError::DecodeFailure(_) => {
                        log::error!("[LOADER] Failed to load BRIR {:?}: {}", source, error)
                    }
                    _ => log::warn!("[LOADER] Rejected BRIR {:?}: {}", source, error),
                }
                *lock(&self.last_error) = Some(error.clone());
                self.handoff.end_load();
                self.set_state(LoadState::Failed);
                self.push_event(LoadEvent::Failed { source, error });
            }
        }
    }

    /// Validate the file and build a populated environment off to the side
    fn build_environment(&self, request: &BrirLoadRequest) -> LoadResult<C::Environment> {
        let path = request.source.as_path();
        if !path.exists() {
            return Err(LoadError::FileNotFound(path.to_path_buf()));
        }

        let format = match request.format {
            Some(format) => format,
            None => BrirFormat::sniff(path)?,
        };
        let expected = self.core.sample_rate();
        let found = self.decoders.declared_sample_rate(format, path)?;
        if found != expected {
            return Err(LoadError::SampleRateMismatch { expected, found });
        }

        let decoder = self.decoders.decoder_for(format)?;

        let mut environment = self.core.create_environment();
        environment.set_reverberation_order(self.order);
        decoder.decode_into(path, &mut environment)?;
        if !environment.has_brir() {
            return Err(LoadError::DecodeFailure(format!(
                "{} decoder installed no impulse responses from {:?}",
                decoder.name(),
                path
            )));
        }

        log::debug!(
            "[LOADER] Built {} environment from {:?} ({:?} order)",
            format.name(),
            path,
            self.order
        );
        Ok(environment)
    }
}

fn worker_loop<C: SpatialCore>(shared: Arc<LoaderShared<C>>) {
    log::debug!("[LOADER] Worker started");
    while let Some(request) = shared.next_request() {
        shared.attempt(request);
    }
    log::debug!("[LOADER] Worker stopped");
}

/// Control-side handle of the BRIR loader
///
/// Dropping the loader discards any pending request and joins the worker.
pub struct BrirLoader<C: SpatialCore> {
    shared: Arc<LoaderShared<C>>,
    params: Arc<ReverbParameters>,
    brir_directory: PathBuf,
}

impl<C: SpatialCore> BrirLoader<C> {
    pub(crate) fn new(
        core: Arc<C>,
        decoders: FormatDecoders<C::Environment>,
        order: ReverberationOrder,
        handoff: Arc<EnvironmentHandoff<C::Environment>>,
        events: rtrb::Producer<LoadEvent>,
        params: Arc<ReverbParameters>,
        brir_directory: PathBuf,
    ) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                core,
                decoders,
                order,
                handoff,
                queue: Mutex::new(LoadQueue::default()),
                idle: Condvar::new(),
                state: AtomicU8::new(LoadState::Idle as u8),
                identity: Mutex::new(None),
                last_error: Mutex::new(None),
                events: Mutex::new(events),
                shutdown: AtomicBool::new(false),
            }),
            params,
            brir_directory,
        }
    }

    /// Queue a BRIR load
    ///
    /// Returns `false` without doing anything if `request.source` is the BRIR
    /// already loaded. Otherwise the request replaces any request still
    /// waiting, the worker is started if needed, and `true` is returned.
    pub fn submit_load(&self, request: BrirLoadRequest) -> bool {
        let mut queue = lock(&self.shared.queue);

        if lock(&self.shared.identity).as_deref() == Some(request.source.as_path()) {
            log::debug!("[LOADER] {:?} is already loaded", request.source);
            return false;
        }

        let source = request.source.clone();
        if let Some(superseded) = queue.pending.replace(request) {
            log::info!(
                "[LOADER] Superseded pending request {:?} with {:?}",
                superseded.source,
                source
            );
        }

        if queue.worker_active {
            return true;
        }

        // Previous worker already left its loop; reap it
        if let Some(finished) = queue.worker.take() {
            if finished.join().is_err() {
                log::error!("[LOADER] Previous worker panicked");
            }
        }

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("brir-loader".to_string())
            .spawn(move || worker_loop(shared))
        {
            Ok(handle) => {
                queue.worker_active = true;
                queue.worker = Some(handle);
                true
            }
            Err(e) => {
                log::error!("[LOADER] Failed to spawn loader thread: {}", e);
                queue.pending = None;
                false
            }
        }
    }

    /// Select a menu entry and load it if it is a bundled preset
    ///
    /// Custom-file markers only record the selection; the host follows up
    /// with [`submit_load`](Self::submit_load) once the user picked a file.
    pub fn select_preset(&self, index: u8) -> bool {
        self.params.set_brir_selection(index);
        self.setup(self.shared.core.sample_rate())
    }

    /// Load the selected bundled preset authored at `sample_rate`
    pub fn setup(&self, sample_rate: u32) -> bool {
        let preset = self.params.brir_selection();
        match preset.bundled_file_name(sample_rate) {
            Some(file_name) => self.submit_load(
                BrirLoadRequest::new(self.brir_directory.join(file_name))
                    .with_format(BrirFormat::Binary),
            ),
            None => {
                log::debug!("[LOADER] {} selected, waiting for a file", preset.label());
                false
            }
        }
    }

    pub fn load_state(&self) -> LoadState {
        LoadState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Path of the last successfully loaded BRIR
    pub fn current_identity(&self) -> Option<PathBuf> {
        lock(&self.shared.identity).clone()
    }

    /// Error of the most recent attempt, `None` if it succeeded
    pub fn last_error(&self) -> Option<LoadError> {
        lock(&self.shared.last_error).clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.handoff.is_loading()
    }

    /// Display label: preset name, or the file stem of a custom BRIR
    pub fn identity_label(&self) -> String {
        let preset = self.params.brir_selection();
        if preset.is_bundled() {
            return preset.label().to_string();
        }
        self.current_identity()
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Block until the worker has drained the queue
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = lock(&self.shared.queue);
        while queue.worker_active {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .idle
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }
        true
    }
}

impl<C: SpatialCore> Drop for BrirLoader<C> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let worker = {
            let mut queue = lock(&self.shared.queue);
            queue.pending = None;
            queue.worker.take()
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("[LOADER] Worker panicked during shutdown");
            }
        }
    }
}
