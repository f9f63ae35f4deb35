//! Identifier mapping store: lookups between application users, catalog
//! ids, dataset ids and dense model indices.
//!
//! Built once from the two mapping artifacts and never mutated afterwards.

use cinerank_core::error::{ArtifactKind, LoadError};
use cinerank_core::ids::{AppUserId, CatalogId, DatasetItemId, ItemIndex, UserIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const MAP_FORMAT_VERSION: u32 = 1;

/// `user_map` artifact: application user id to model user index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMapArtifact {
    pub format_version: u32,
    #[serde(default)]
    pub user_to_index: BTreeMap<AppUserId, UserIndex>,
}

/// `item_map` artifact: the four item sub-maps. A sub-map missing from the
/// file deserializes as empty and is rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMapArtifact {
    pub format_version: u32,
    #[serde(default)]
    pub dataset_to_index: BTreeMap<DatasetItemId, ItemIndex>,
    #[serde(default)]
    pub index_to_dataset: BTreeMap<ItemIndex, DatasetItemId>,
    #[serde(default)]
    pub dataset_to_catalog: BTreeMap<DatasetItemId, CatalogId>,
    #[serde(default)]
    pub catalog_to_dataset: BTreeMap<CatalogId, DatasetItemId>,
}

trait Versioned {
    const KIND: ArtifactKind;
    fn format_version(&self) -> u32;
}

impl Versioned for UserMapArtifact {
    const KIND: ArtifactKind = ArtifactKind::UserMap;
    fn format_version(&self) -> u32 {
        self.format_version
    }
}

impl Versioned for ItemMapArtifact {
    const KIND: ArtifactKind = ArtifactKind::ItemMap;
    fn format_version(&self) -> u32 {
        self.format_version
    }
}

fn read_artifact<T: DeserializeOwned + Versioned>(path: &Path) -> Result<T, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        artifact: T::KIND,
        source,
    })?;
    let artifact: T = serde_json::from_slice(&bytes).map_err(|source| LoadError::Parse {
        artifact: T::KIND,
        source,
    })?;
    if artifact.format_version() != MAP_FORMAT_VERSION {
        return Err(LoadError::UnsupportedFormat {
            artifact: T::KIND,
            found: artifact.format_version(),
            expected: MAP_FORMAT_VERSION,
        });
    }
    Ok(artifact)
}

pub fn read_user_map(path: &Path) -> Result<UserMapArtifact, LoadError> {
    read_artifact(path)
}

pub fn read_item_map(path: &Path) -> Result<ItemMapArtifact, LoadError> {
    read_artifact(path)
}

/// In-memory lookup tables between the four identifier spaces.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    user_to_index: HashMap<AppUserId, UserIndex>,
    dataset_to_index: HashMap<DatasetItemId, ItemIndex>,
    // Ordered: candidate enumeration follows ascending model index.
    index_to_dataset: BTreeMap<ItemIndex, DatasetItemId>,
    dataset_to_catalog: HashMap<DatasetItemId, CatalogId>,
    catalog_to_dataset: HashMap<CatalogId, DatasetItemId>,
}

impl MappingStore {
    /// A store with every table empty: the disabled state.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assemble a store without validating it. See [`MappingStore::validate`].
    pub fn from_artifacts(users: UserMapArtifact, items: ItemMapArtifact) -> Self {
        Self {
            user_to_index: users.user_to_index.into_iter().collect(),
            dataset_to_index: items.dataset_to_index.into_iter().collect(),
            index_to_dataset: items.index_to_dataset,
            dataset_to_catalog: items.dataset_to_catalog.into_iter().collect(),
            catalog_to_dataset: items.catalog_to_dataset.into_iter().collect(),
        }
    }

    /// Check the store is usable with embedding tables of the given extents.
    ///
    /// The two item-index maps must be non-empty exact inverses, the catalog
    /// link maps must be non-empty, and every index must fall inside its
    /// embedding table.
    pub fn validate(&self, num_users: usize, num_items: usize) -> Result<(), LoadError> {
        if self.user_to_index.is_empty() {
            return Err(LoadError::MalformedMappings("user map is empty".to_string()));
        }
        if self.dataset_to_index.is_empty() || self.index_to_dataset.is_empty() {
            return Err(LoadError::MalformedMappings(
                "item index maps 'dataset_to_index' and 'index_to_dataset' must both be non-empty"
                    .to_string(),
            ));
        }
        if self.dataset_to_index.len() != self.index_to_dataset.len() {
            return Err(LoadError::MalformedMappings(format!(
                "item index maps differ in size ({} dataset ids vs {} indices)",
                self.dataset_to_index.len(),
                self.index_to_dataset.len()
            )));
        }
        for (&dataset_id, &index) in &self.dataset_to_index {
            if self.index_to_dataset.get(&index) != Some(&dataset_id) {
                return Err(LoadError::MalformedMappings(format!(
                    "dataset id {dataset_id} maps to index {index}, which does not map back to it"
                )));
            }
        }
        if self.dataset_to_catalog.is_empty() || self.catalog_to_dataset.is_empty() {
            return Err(LoadError::MalformedMappings(
                "catalog link maps 'dataset_to_catalog' and 'catalog_to_dataset' must both be non-empty"
                    .to_string(),
            ));
        }
        if let Some(index) = self.user_to_index.values().find(|i| i.0 >= num_users) {
            return Err(LoadError::MalformedMappings(format!(
                "user index {index} is outside the user embedding table ({num_users} rows)"
            )));
        }
        if let Some((index, _)) = self.index_to_dataset.range(ItemIndex(num_items)..).next() {
            return Err(LoadError::MalformedMappings(format!(
                "item index {index} is outside the item embedding table ({num_items} rows)"
            )));
        }
        Ok(())
    }

    /// Whether every table needed to serve a recommendation is populated.
    pub fn is_complete(&self) -> bool {
        !self.user_to_index.is_empty()
            && !self.dataset_to_index.is_empty()
            && !self.index_to_dataset.is_empty()
            && !self.dataset_to_catalog.is_empty()
            && !self.catalog_to_dataset.is_empty()
    }

    pub fn user_index(&self, user: AppUserId) -> Option<UserIndex> {
        self.user_to_index.get(&user).copied()
    }

    pub fn dataset_to_index(&self, id: DatasetItemId) -> Option<ItemIndex> {
        self.dataset_to_index.get(&id).copied()
    }

    pub fn index_to_dataset(&self, index: ItemIndex) -> Option<DatasetItemId> {
        self.index_to_dataset.get(&index).copied()
    }

    pub fn dataset_to_catalog(&self, id: DatasetItemId) -> Option<CatalogId> {
        self.dataset_to_catalog.get(&id).copied()
    }

    pub fn catalog_to_dataset(&self, id: CatalogId) -> Option<DatasetItemId> {
        self.catalog_to_dataset.get(&id).copied()
    }

    /// Catalog id -> dataset id -> model index. `None` if either hop fails.
    pub fn catalog_to_index(&self, id: CatalogId) -> Option<ItemIndex> {
        self.catalog_to_dataset(id)
            .and_then(|dataset_id| self.dataset_to_index(dataset_id))
    }

    /// Model index -> dataset id -> catalog id. `None` if either hop fails.
    pub fn index_to_catalog(&self, index: ItemIndex) -> Option<CatalogId> {
        self.index_to_dataset(index)
            .and_then(|dataset_id| self.dataset_to_catalog(dataset_id))
    }

    /// Every model item index known to the training catalog, ascending.
    pub fn candidates(&self) -> Vec<ItemIndex> {
        self.index_to_dataset.keys().copied().collect()
    }

    pub fn num_users(&self) -> usize {
        self.user_to_index.len()
    }

    pub fn num_items(&self) -> usize {
        self.index_to_dataset.len()
    }

    pub fn num_catalog_links(&self) -> usize {
        self.catalog_to_dataset.len()
    }
}
