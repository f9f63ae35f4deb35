//! Typed identifiers for the four id spaces the recommender translates between.
//!
//! The serving application, the training dataset, the catalog provider, and the
//! embedding tables each number movies (and users) differently. Wrapping every
//! space in its own newtype keeps a dataset id from ever being used where a
//! catalog id or a model index is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a user in the serving application's user store.
///
/// The training job keyed users by this id directly, so there is no separate
/// dataset-user layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppUserId(pub i64);

/// Movie id in the catalog provider's id space. The application's own movie
/// primary key is defined equal to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub i64);

/// Movie id in the training dataset's id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetItemId(pub i64);

/// Dense zero-based row of the user embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIndex(pub usize);

/// Dense zero-based row of the item embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIndex(pub usize);

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

impl_display!(AppUserId, CatalogId, DatasetItemId, UserIndex, ItemIndex);
