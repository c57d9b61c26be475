//! Marqueurs de changement horodatés, un par couple (profil, type)
//!
//! Deux usages du même primitif :
//!
//! - déclenchement sur niveau (volume, muet) : le client mémorise le
//!   dernier horodatage vu et relit l'état complet quand il augmente ;
//!   le marqueur n'est jamais effacé ;
//! - déclenchement sur front (rafraîchissement, configuration) : un
//!   marqueur plus récent que la fenêtre est consommé puis supprimé.

use crate::clock::Clock;
use crate::persistence::{DataLayout, read_text, remove_if_exists, write_atomic};
use crate::profile::ProfileId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fenêtre de récence par défaut des signaux sur front
pub const DEFAULT_SIGNAL_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Volume,
    Mute,
    DashboardRefresh,
    ConfigChange,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Volume,
        SignalKind::Mute,
        SignalKind::DashboardRefresh,
        SignalKind::ConfigChange,
    ];

    /// Nom du fichier marqueur
    pub fn marker_name(&self) -> &'static str {
        match self {
            SignalKind::Volume => "volume",
            SignalKind::Mute => "mute",
            SignalKind::DashboardRefresh => "dashboard_refresh",
            SignalKind::ConfigChange => "config_change",
        }
    }

    /// Vrai pour les signaux consommés à la lecture
    pub fn is_edge_triggered(&self) -> bool {
        matches!(self, SignalKind::DashboardRefresh | SignalKind::ConfigChange)
    }
}

impl FromStr for SignalKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "volume" => Ok(SignalKind::Volume),
            "mute" => Ok(SignalKind::Mute),
            "refresh" | "dashboard_refresh" | "dashboardrefresh" => {
                Ok(SignalKind::DashboardRefresh)
            }
            "config" | "config_change" | "configchange" => Ok(SignalKind::ConfigChange),
            other => Err(Error::validation(format!("unknown signal '{other}'"))),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker_name())
    }
}

pub struct SignalChannel {
    layout: DataLayout,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl SignalChannel {
    pub fn new(layout: DataLayout, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            layout,
            clock,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Écrit `now()` comme marqueur et le renvoie
    pub fn raise(&self, profile: &ProfileId, kind: SignalKind) -> Result<i64> {
        let now = self.clock.now_millis();
        let path = self.layout.signal_path(profile, kind.marker_name());
        write_atomic(&path, now.to_string().as_bytes())?;
        debug!(profile = %profile, signal = %kind, timestamp = now, "Signal raised");
        Ok(now)
    }

    /// Horodatage du marqueur, 0 s'il est absent ou illisible
    pub fn check(&self, profile: &ProfileId, kind: SignalKind) -> i64 {
        let path = self.layout.signal_path(profile, kind.marker_name());
        match read_text(&path) {
            Ok(Some(text)) => text.trim().parse().unwrap_or_else(|_| {
                warn!(profile = %profile, signal = %kind, "Unreadable signal marker, ignoring it");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!(profile = %profile, signal = %kind, "Cannot read signal marker: {}", e);
                0
            }
        }
    }

    /// Vrai si le marqueur est plus récent que la fenêtre
    pub fn is_recent(&self, timestamp: i64) -> bool {
        let window = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        timestamp > 0 && self.clock.now_millis().saturating_sub(timestamp) < window
    }

    /// Consomme un signal sur front
    ///
    /// Renvoie vrai et supprime le marqueur s'il est récent. Un marqueur
    /// trop ancien est supprimé sans déclencher.
    pub fn consume_recent(&self, profile: &ProfileId, kind: SignalKind) -> Result<bool> {
        let timestamp = self.check(profile, kind);
        if timestamp == 0 {
            return Ok(false);
        }
        let recent = self.is_recent(timestamp);
        self.clear(profile, kind)?;
        if recent {
            debug!(profile = %profile, signal = %kind, timestamp, "Signal consumed");
        } else {
            debug!(profile = %profile, signal = %kind, timestamp, "Expired signal discarded");
        }
        Ok(recent)
    }

    pub fn clear(&self, profile: &ProfileId, kind: SignalKind) -> Result<()> {
        remove_if_exists(&self.layout.signal_path(profile, kind.marker_name()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!("refresh".parse::<SignalKind>().unwrap(), SignalKind::DashboardRefresh);
        assert_eq!("config".parse::<SignalKind>().unwrap(), SignalKind::ConfigChange);
        assert!("other".parse::<SignalKind>().is_err());
        assert!(SignalKind::ConfigChange.is_edge_triggered());
        assert!(!SignalKind::Volume.is_edge_triggered());
    }
}
