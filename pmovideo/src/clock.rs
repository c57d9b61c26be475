//! Source de temps (millisecondes Unix)

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Horloge utilisée pour les horodatages du scan, des signaux et du
/// déclencheur de rafraîchissement.
pub trait Clock: Send + Sync {
    /// Instant courant en millisecondes depuis l'époque Unix
    fn now_millis(&self) -> i64;
}

/// Horloge système
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Horloge pilotée à la main, pour les tests et les simulations
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
