//! Offline builder for the user and item mapping artifacts.
//!
//! Reads the training ratings CSV (`userId`, `movieId` columns) and the
//! dataset's links CSV (`movieId`, `tmdbId` columns). Model indices are
//! assigned by sorting the unique ids and enumerating them, which is how the
//! embedding tables were laid out at training time.

use crate::mappings::{ItemMapArtifact, UserMapArtifact, MAP_FORMAT_VERSION};
use cinerank_core::error::{CinerankError, CinerankResult};
use cinerank_core::ids::{AppUserId, CatalogId, DatasetItemId, ItemIndex, UserIndex};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// The two artifacts the loader consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingArtifacts {
    pub users: UserMapArtifact,
    pub items: ItemMapArtifact,
}

impl MappingArtifacts {
    pub fn write(&self, user_map_out: &Path, item_map_out: &Path) -> CinerankResult<()> {
        std::fs::write(user_map_out, serde_json::to_vec(&self.users)?)?;
        info!(path = %user_map_out.display(), users = self.users.user_to_index.len(), "Wrote user map");
        std::fs::write(item_map_out, serde_json::to_vec(&self.items)?)?;
        info!(
            path = %item_map_out.display(),
            items = self.items.index_to_dataset.len(),
            catalog_links = self.items.catalog_to_dataset.len(),
            "Wrote item map"
        );
        Ok(())
    }
}

pub fn build_mappings(ratings_csv: &Path, links_csv: &Path) -> CinerankResult<MappingArtifacts> {
    let ratings = std::fs::read_to_string(ratings_csv)?;
    let links = std::fs::read_to_string(links_csv)?;
    build_mappings_from_str(
        &ratings_csv.display().to_string(),
        &ratings,
        &links_csv.display().to_string(),
        &links,
    )
}

pub fn build_mappings_from_str(
    ratings_name: &str,
    ratings: &str,
    links_name: &str,
    links: &str,
) -> CinerankResult<MappingArtifacts> {
    let mut user_ids = BTreeSet::new();
    let mut movie_ids = BTreeSet::new();

    let table = CsvTable::parse(ratings_name, ratings)?;
    let user_col = table.column("userId")?;
    let movie_col = table.column("movieId")?;
    for row in table.rows() {
        user_ids.insert(row.int(user_col)?);
        movie_ids.insert(row.int(movie_col)?);
    }

    let mut users = UserMapArtifact {
        format_version: MAP_FORMAT_VERSION,
        ..Default::default()
    };
    for (index, id) in user_ids.into_iter().enumerate() {
        users.user_to_index.insert(AppUserId(id), UserIndex(index));
    }

    let mut items = ItemMapArtifact {
        format_version: MAP_FORMAT_VERSION,
        ..Default::default()
    };
    for (index, id) in movie_ids.into_iter().enumerate() {
        items.dataset_to_index.insert(DatasetItemId(id), ItemIndex(index));
        items.index_to_dataset.insert(ItemIndex(index), DatasetItemId(id));
    }

    let table = CsvTable::parse(links_name, links)?;
    let movie_col = table.column("movieId")?;
    let tmdb_col = table.column("tmdbId")?;
    let mut dropped = 0usize;
    for row in table.rows() {
        let dataset_id = DatasetItemId(row.int(movie_col)?);
        // Links without a usable catalog id are dropped, not errors.
        let Some(catalog_id) = row.optional_int(tmdb_col) else {
            dropped += 1;
            continue;
        };
        items.dataset_to_catalog.insert(dataset_id, CatalogId(catalog_id));
        items.catalog_to_dataset.insert(CatalogId(catalog_id), dataset_id);
    }

    info!(
        users = users.user_to_index.len(),
        items = items.index_to_dataset.len(),
        catalog_links = items.dataset_to_catalog.len(),
        dropped_links = dropped,
        "Built mapping tables"
    );

    Ok(MappingArtifacts { users, items })
}

struct CsvTable<'a> {
    name: &'a str,
    header: Vec<&'a str>,
    body: Vec<(usize, &'a str)>,
}

struct CsvRow<'a> {
    name: &'a str,
    line: usize,
    cells: Vec<&'a str>,
}

impl<'a> CsvTable<'a> {
    fn parse(name: &'a str, text: &'a str) -> CinerankResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| CinerankError::InvalidData(format!("{name}: file is empty")))?;

        Ok(Self {
            name,
            header: header.split(',').map(|h| h.trim().trim_matches('"')).collect(),
            body: lines.collect(),
        })
    }

    fn column(&self, wanted: &str) -> CinerankResult<usize> {
        self.header
            .iter()
            .position(|h| *h == wanted)
            .ok_or_else(|| {
                CinerankError::InvalidData(format!("{}: missing column '{wanted}'", self.name))
            })
    }

    fn rows(&self) -> impl Iterator<Item = CsvRow<'a>> + '_ {
        self.body.iter().map(|&(line, text)| CsvRow {
            name: self.name,
            line,
            cells: text.split(',').map(|c| c.trim().trim_matches('"')).collect(),
        })
    }
}

impl CsvRow<'_> {
    fn int(&self, col: usize) -> CinerankResult<i64> {
        let cell = self.cells.get(col).copied().unwrap_or("");
        parse_int(cell).ok_or_else(|| {
            CinerankError::InvalidData(format!(
                "{}:{}: expected an integer in column {}, found '{cell}'",
                self.name,
                self.line,
                col + 1
            ))
        })
    }

    fn optional_int(&self, col: usize) -> Option<i64> {
        self.cells.get(col).copied().and_then(parse_int)
    }
}

/// Integers, or floats with no fractional part (`862.0`), as written by
/// tools that store a column with gaps as floating point.
fn parse_int(cell: &str) -> Option<i64> {
    if cell.is_empty() {
        return None;
    }
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATINGS: &str = "userId,movieId,rating,timestamp\n\
        12,300,4.0,964982703\n\
        3,100,5.0,964981247\n\
        12,100,3.5,964982224\n\
        7,200,4.0,964983815\n";

    const LINKS: &str = "movieId,imdbId,tmdbId\n\
        100,0114709,862\n\
        200,0113497,8844.0\n\
        300,0113228,\n\
        400,0114885,31357\n";

    #[test]
    fn test_indices_follow_sorted_ids() {
        let artifacts = build_mappings_from_str("ratings.csv", RATINGS, "links.csv", LINKS).unwrap();

        let users: Vec<_> = artifacts.users.user_to_index.iter().collect();
        assert_eq!(
            users,
            vec![
                (&AppUserId(3), &UserIndex(0)),
                (&AppUserId(7), &UserIndex(1)),
                (&AppUserId(12), &UserIndex(2)),
            ]
        );
        assert_eq!(
            artifacts.items.dataset_to_index.get(&DatasetItemId(300)),
            Some(&ItemIndex(2))
        );
        assert_eq!(
            artifacts.items.index_to_dataset.get(&ItemIndex(0)),
            Some(&DatasetItemId(100))
        );
    }

    #[test]
    fn test_links_drop_missing_catalog_ids() {
        let artifacts = build_mappings_from_str("ratings.csv", RATINGS, "links.csv", LINKS).unwrap();
        let items = &artifacts.items;

        assert_eq!(items.dataset_to_catalog.get(&DatasetItemId(100)), Some(&CatalogId(862)));
        assert_eq!(items.dataset_to_catalog.get(&DatasetItemId(200)), Some(&CatalogId(8844)));
        assert!(!items.dataset_to_catalog.contains_key(&DatasetItemId(300)));
        // Linked but never rated: kept in the link maps, absent from the index maps.
        assert_eq!(items.catalog_to_dataset.get(&CatalogId(31357)), Some(&DatasetItemId(400)));
        assert!(!items.dataset_to_index.contains_key(&DatasetItemId(400)));
    }

    #[test]
    fn test_built_artifacts_pass_validation() {
        let artifacts = build_mappings_from_str("ratings.csv", RATINGS, "links.csv", LINKS).unwrap();
        let store = crate::mappings::MappingStore::from_artifacts(artifacts.users, artifacts.items);
        store.validate(3, 3).unwrap();
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let err = build_mappings_from_str("ratings.csv", "user,movie\n1,2\n", "links.csv", LINKS)
            .unwrap_err();
        assert!(err.to_string().contains("missing column 'userId'"));
    }

    #[test]
    fn test_bad_row_names_file_and_line() {
        let ratings = "userId,movieId\n1,10\nx,11\n";
        let err = build_mappings_from_str("ratings.csv", ratings, "links.csv", LINKS).unwrap_err();
        assert!(err.to_string().contains("ratings.csv:3"));
    }

    #[test]
    fn test_parse_int_accepts_integral_floats_only() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("862.0"), Some(862));
        assert_eq!(parse_int("1.5"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("NaN"), None);
    }
}
