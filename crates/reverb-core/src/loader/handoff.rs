//! Loader → audio thread environment handoff
//!
//! The loader builds a complete environment off to the side and drops it into
//! a single-slot mailbox. The audio thread adopts it at a block boundary.
//!
//! ```text
//! Loader thread                         Audio thread
//! ─────────────                         ────────────
//! begin_load()   is_loading = true      is_loading? → silence
//! build + decode (slow)
//! publish(env)   slot = env
//!                has_published = true
//! end_load()     is_loading = false ──▶ acquire is_loading == false
//!                (release)              try_take() → adopt env
//! ```
//!
//! Because `publish` happens-before the release-store in `end_load`, an audio
//! thread that acquire-loads `is_loading == false` always finds the new
//! environment in the slot. The audio side only ever uses `try_lock`, so it
//! never waits on the loader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

use basedrop::Owned;

pub(crate) struct EnvironmentHandoff<E: Send + 'static> {
    /// Silence gate: written by the loader, read by the audio thread
    is_loading: AtomicBool,
    /// Set when the slot holds an environment the audio thread has not adopted
    has_published: AtomicBool,
    slot: Mutex<Option<Owned<E>>>,
}

impl<E: Send + 'static> EnvironmentHandoff<E> {
    pub(crate) fn new() -> Self {
        Self {
            is_loading: AtomicBool::new(false),
            has_published: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    /// Loader: close the gate before touching files
    pub(crate) fn begin_load(&self) {
        self.is_loading.store(true, Ordering::SeqCst);
    }

    /// Loader: make a fully built environment available to the audio thread
    ///
    /// An environment published earlier but never adopted is replaced and
    /// dropped here, on the loader thread.
    pub(crate) fn publish(&self, environment: Owned<E>) {
        let superseded = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.replace(environment)
        };
        self.has_published.store(true, Ordering::Release);
        if superseded.is_some() {
            log::debug!("Replaced an environment the audio thread never adopted");
        }
    }

    /// Loader: reopen the gate; must come after `publish`
    pub(crate) fn end_load(&self) {
        self.is_loading.store(false, Ordering::Release);
    }

    /// Audio/UI: whether a load is in progress
    #[inline]
    pub(crate) fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::Acquire)
    }

    /// Audio thread: take the published environment, if any (never blocks)
    #[inline]
    pub(crate) fn try_take(&self) -> Option<Owned<E>> {
        if !self.has_published.swap(false, Ordering::AcqRel) {
            return None;
        }
        match self.slot.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => {
                // Loader is mid-publish; pick it up next block
                self.has_published.store(true, Ordering::Release);
                None
            }
        }
    }
}
