//! Ordre de lecture par profil
//!
//! L'ordre persisté est une permutation des clés `chemin|nom` du
//! catalogue. Il n'est jamais modifié directement pour ajouter ou retirer
//! des entrées : la réconciliation avec le catalogue vivant s'en charge à
//! chaque lecture, les déplacements ne font que permuter des voisins.

use crate::catalog::CatalogCache;
use crate::persistence::{DataLayout, read_json, write_json_atomic};
use crate::profile::ProfileId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Sens d'un déplacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

impl FromStr for MoveDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(MoveDirection::Up),
            "down" => Ok(MoveDirection::Down),
            other => Err(Error::validation(format!(
                "direction must be 'up' or 'down', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveDirection::Up => f.write_str("up"),
            MoveDirection::Down => f.write_str("down"),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OrderRecord {
    #[serde(default)]
    order: Vec<String>,
}

/// Fusion pure de l'ordre persisté avec le catalogue
///
/// Les clés persistées encore présentes gardent leur ordre relatif, les
/// nouvelles arrivent ensuite triées par `(nom, index de répertoire)`.
pub fn merge_order(persisted: &[String], catalog: &CatalogCache) -> Vec<String> {
    let live: HashSet<String> = catalog.keys().into_iter().collect();

    let mut placed = HashSet::new();
    let mut result: Vec<String> = persisted
        .iter()
        .filter(|k| live.contains(*k) && placed.insert((*k).clone()))
        .cloned()
        .collect();

    let mut arrivals: Vec<_> = catalog
        .descriptors
        .iter()
        .filter(|d| !placed.contains(&d.key()))
        .collect();
    arrivals.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.dir_index.cmp(&b.dir_index))
            .then(a.dir_path.cmp(&b.dir_path))
    });

    for descriptor in arrivals {
        let key = descriptor.key();
        if placed.insert(key.clone()) {
            result.push(key);
        }
    }
    result
}

/// Réconciliation et déplacements, adossés au fichier d'ordre du profil
#[derive(Debug, Clone)]
pub struct OrderReconciler {
    layout: DataLayout,
}

impl OrderReconciler {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Ordre persisté brut ; vide s'il est absent ou illisible
    pub fn load(&self, profile: &ProfileId) -> Vec<String> {
        let path = self.layout.order_path(profile);
        match read_json::<OrderRecord>(&path) {
            Ok(record) => record.unwrap_or_default().order,
            Err(e) => {
                warn!(
                    profile = %profile,
                    "Unreadable video order, starting from an empty one: {}", e
                );
                Vec::new()
            }
        }
    }

    fn persist(&self, profile: &ProfileId, order: &[String]) -> Result<()> {
        let record = OrderRecord {
            order: order.to_vec(),
        };
        write_json_atomic(&self.layout.order_path(profile), &record)
    }

    /// Ordre courant du profil, réécrit seulement s'il a changé
    ///
    /// Un échec d'écriture est journalisé : l'ordre calculé reste valable
    /// et sera recalculé à la prochaine lecture.
    pub fn reconcile(&self, profile: &ProfileId, catalog: &CatalogCache) -> Vec<String> {
        let persisted = self.load(profile);
        let result = merge_order(&persisted, catalog);
        if result != persisted {
            match self.persist(profile, &result) {
                Ok(()) => {
                    debug!(profile = %profile, entries = result.len(), "Video order reconciled")
                }
                Err(e) => warn!(profile = %profile, "Failed to persist reconciled order: {}", e),
            }
        }
        result
    }

    pub fn move_up(
        &self,
        profile: &ProfileId,
        catalog: &CatalogCache,
        key: &str,
    ) -> Result<Vec<String>> {
        self.move_key(profile, catalog, key, MoveDirection::Up)
    }

    pub fn move_down(
        &self,
        profile: &ProfileId,
        catalog: &CatalogCache,
        key: &str,
    ) -> Result<Vec<String>> {
        self.move_key(profile, catalog, key, MoveDirection::Down)
    }

    /// Échange `key` avec son voisin ; sans effet aux extrémités
    pub fn move_key(
        &self,
        profile: &ProfileId,
        catalog: &CatalogCache,
        key: &str,
        direction: MoveDirection,
    ) -> Result<Vec<String>> {
        let mut order = self.reconcile(profile, catalog);
        let index = order
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| Error::not_found(format!("video '{key}' is not in the order")))?;

        let target = match direction {
            MoveDirection::Up if index > 0 => index - 1,
            MoveDirection::Down if index + 1 < order.len() => index + 1,
            _ => {
                debug!(profile = %profile, key, %direction, "Move at boundary, nothing to do");
                return Ok(order);
            }
        };

        order.swap(index, target);
        self.persist(profile, &order)?;
        debug!(profile = %profile, key, %direction, "Video moved");
        Ok(order)
    }
}
