use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide remote canvas status.
///
/// Constructed explicitly and shared by every recorder, translator, registry
/// and manager of one process. Deactivation is sticky: once set it is never
/// cleared.
#[derive(Debug, Default)]
pub struct RemoteCanvasState {
    deactivated: AtomicBool,
}

impl RemoteCanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_deactivated(&self) -> bool {
        self.deactivated.load(Ordering::Acquire)
    }

    /// Sets the sticky flag. Returns `true` for the call that flipped it.
    pub fn deactivate(&self) -> bool {
        let first = !self.deactivated.swap(true, Ordering::AcqRel);
        if first {
            log::warn!("remote canvas deactivated for this process");
        }
        first
    }
}
