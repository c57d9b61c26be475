use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Garde « une seule requête en vol » pour un canal de sondage
///
/// Un sondage tenté pendant qu'un autre est en cours est abandonné,
/// jamais mis en file.
#[derive(Debug, Clone, Default)]
pub struct PollGate {
    busy: Arc<AtomicBool>,
}

impl PollGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<PollPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PollPermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Libère la garde à la destruction
#[derive(Debug)]
pub struct PollPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for PollPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
