//! Prédicat de fraîcheur du cache catalogue
//!
//! Aucune notification n'arrive des répertoires : la péremption se
//! découvre à la lecture, en comparant la date de modification la plus
//! récente des répertoires configurés à l'horodatage du dernier scan.
//! Le prédicat penche vers le faux positif : dans le doute, on rescanne.

use crate::fs::MediaFs;
use tracing::debug;

/// Répertoires effectivement couverts par le catalogue
///
/// La liste configurée tant qu'au moins un de ses répertoires se résout
/// (les index restent les positions dans cette liste). Sinon
/// `default_dir`, à l'index 0, s'il se résout.
pub fn effective_directories(
    fs: &dyn MediaFs,
    configured_dirs: &[String],
    default_dir: Option<&str>,
) -> Vec<String> {
    if configured_dirs.iter().any(|dir| fs.resolve_dir(dir).is_some()) {
        return configured_dirs.to_vec();
    }
    match default_dir {
        Some(dir) if fs.resolve_dir(dir).is_some() => vec![dir.to_string()],
        _ => configured_dirs.to_vec(),
    }
}

/// Date de modification maximale des répertoires résolus
///
/// Si aucun répertoire configuré ne se résout, seul `default_dir` est
/// essayé. `None` signifie qu'aucun répertoire n'a pu être résolu.
pub fn max_modification_time(
    fs: &dyn MediaFs,
    configured_dirs: &[String],
    default_dir: Option<&str>,
) -> Option<i64> {
    let candidates: Vec<_> = effective_directories(fs, configured_dirs, default_dir)
        .iter()
        .filter_map(|dir| fs.resolve_dir(dir))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    Some(
        candidates
            .iter()
            .filter_map(|path| fs.modified_millis(path))
            .max()
            .unwrap_or(0),
    )
}

/// Règle de décision, sans accès disque
pub fn is_stale_at(max_mod_time: Option<i64>, last_scan_timestamp: i64) -> bool {
    match max_mod_time {
        _ if last_scan_timestamp == 0 => true,
        None => true,
        Some(max) => max > last_scan_timestamp,
    }
}

/// Vrai si le cache scanné à `last_scan_timestamp` doit être reconstruit
pub fn is_stale(
    fs: &dyn MediaFs,
    configured_dirs: &[String],
    default_dir: Option<&str>,
    last_scan_timestamp: i64,
) -> bool {
    let max = max_modification_time(fs, configured_dirs, default_dir);
    let stale = is_stale_at(max, last_scan_timestamp);
    debug!(max_mod_time = ?max, last_scan_timestamp, stale, "Catalog staleness check");
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_predicate() {
        assert!(is_stale_at(Some(150), 100));
        assert!(!is_stale_at(Some(90), 100));
        assert!(!is_stale_at(Some(100), 100));
        assert!(is_stale_at(Some(90), 0));
        assert!(is_stale_at(None, 100));
    }

    #[test]
    fn test_max_over_resolved_directories() {
        let fs = MemoryFs::new();
        fs.add_dir("/v/a", 120, &[]);
        fs.add_dir("/v/b", 180, &[]);
        let dirs = vec!["/v/a".to_string(), "/missing".to_string(), "/v/b".to_string()];
        assert_eq!(max_modification_time(&fs, &dirs, None), Some(180));
    }

    #[test]
    fn test_default_directory_fallback() {
        let fs = MemoryFs::new();
        fs.add_dir("/v/default", 70, &[]);
        let dirs = vec!["/gone".to_string()];
        assert_eq!(max_modification_time(&fs, &dirs, Some("/v/default")), Some(70));
        assert_eq!(max_modification_time(&fs, &dirs, Some("/also-gone")), None);
        assert!(is_stale(&fs, &dirs, Some("/also-gone"), 100));
        assert!(!is_stale(&fs, &dirs, Some("/v/default"), 100));
    }

    #[test]
    fn test_effective_directories() {
        let fs = MemoryFs::new();
        fs.add_dir("/v/default", 70, &[]);
        fs.add_dir("/v/a", 10, &[]);

        let none: Vec<String> = vec![];
        assert_eq!(
            effective_directories(&fs, &none, Some("/v/default")),
            vec!["/v/default".to_string()]
        );
        assert!(effective_directories(&fs, &none, Some("/gone")).is_empty());

        let dirs = vec!["/gone".to_string(), "/v/a".to_string()];
        assert_eq!(effective_directories(&fs, &dirs, Some("/v/default")), dirs);
    }
}
