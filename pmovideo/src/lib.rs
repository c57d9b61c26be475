//! # pmovideo - Synchronisation d'écrans vidéo et cohérence du catalogue
//!
//! Cette crate maintient, pour chaque profil (un couple dashboard/écran),
//! un état de contrôle partagé et un ordre de lecture persistant, au-dessus
//! d'un catalogue de vidéos scanné paresseusement :
//! - Catalogue mis en cache, rescanné dès qu'un répertoire a changé
//! - Ordre de lecture par profil, réconcilié avec le catalogue vivant
//! - État de profil durable, écrit par temporaire + renommage atomique
//! - Marqueurs horodatés pour la détection de changement à bas coût
//! - Boucle de sondage côté écran (intervalles fixes, recul exponentiel)
//!
//! # Architecture
//!
//! - **CatalogIndex** : cache du catalogue + prédicat de fraîcheur + scanner
//! - **OrderReconciler** : fusion ordre persisté / catalogue, déplacements
//! - **ProfileStore** : état des profils (last-writer-wins ou compare-and-swap)
//! - **SignalChannel** : signaux sur niveau (volume, muet) et sur front
//! - **VideoSyncService** : façade des opérations exposées aux collaborateurs
//! - **SyncClient** : boucle de synchronisation d'un écran
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use pmovideo::{ProfileId, Settings, VideoSyncService};
//!
//! # fn main() -> pmovideo::Result<()> {
//! let settings = Settings::new("/var/lib/pmovideo", vec!["/srv/videos".into()]);
//! let service = VideoSyncService::new(settings);
//!
//! let profile = ProfileId::resolve(Some(2), None);
//! service.set_current_video(&profile, "intro.mp4", 0)?;
//! service.play(&profile)?;
//!
//! let page = service.list_catalog(&profile, Some(1), Some(20));
//! println!("{} vidéos", page.total);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod clock;
mod error;
pub mod fs;
pub mod order;
pub mod persistence;
pub mod profile;
pub mod service;
pub mod signal;
pub mod sync;

#[cfg(feature = "pmoconfig")]
mod config_ext;

#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "api")]
pub mod openapi;

// Réexports publics
pub use catalog::{CatalogCache, CatalogIndex, CatalogScanner, VideoDescriptor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use fs::{LocalFs, MediaFs, MemoryFs};
pub use order::{MoveDirection, OrderReconciler};
pub use persistence::DataLayout;
pub use profile::{
    ConsistencyMode, CurrentVideo, PlaybackState, ProfileId, ProfilePatch, ProfileState,
    ProfileStore, Toggle, VersionedState,
};
pub use service::{CatalogEntry, CatalogPage, Settings, VideoSyncService};
pub use signal::{SignalChannel, SignalKind};

#[cfg(feature = "pmoconfig")]
pub use config_ext::VideoConfigExt;
