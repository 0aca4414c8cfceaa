//! RT-safe deferred deallocation for reverb environments
//!
//! A reverb environment owns every impulse response of the installed BRIR,
//! which can be several megabytes. When the audio thread adopts a freshly
//! loaded environment it must let go of the previous one, and freeing that
//! memory there would risk an xrun.
//!
//! Environments therefore travel as `basedrop::Owned<T>`: dropping one on the
//! audio thread only enqueues a pointer, and the memory is reclaimed on the
//! `reverb-gc` thread.
//!
//! ```ignore
//! use crate::gc::owned;
//!
//! let env = owned(core.create_environment());
//! drop(env); // queued for the collector, not freed here
//! ```

use basedrop::{Collector, Handle, Owned};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Interval between collection passes on the GC thread
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("reverb-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it has to be created on the thread that runs it
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Reverb GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Without a GC thread nothing is ever reclaimed, which only leaks;
            // a leaked collector still hands out valid handles.
            log::error!("Failed to start reverb GC thread, deferred drops will leak");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Get a handle for creating `Owned<T>`/`Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

/// Wrap a value so that dropping it anywhere defers deallocation to the GC thread
pub fn owned<T: Send + 'static>(value: T) -> Owned<T> {
    Owned::new(&gc_handle(), value)
}
