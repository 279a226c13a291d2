//! One B+ tree per indexed column, with lifecycle and maintenance hooks
//! kept in sync by the query facade on every insert/update/delete.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::index::btree::BTree;
use crate::page_directory::PageDirectory;
use crate::rid::Rid;
use crate::NULL;

pub struct IndexManager {
    indices: Vec<Option<BTree>>,
    key_column: usize,
}

impl IndexManager {
    /// Creates the manager and eagerly builds the primary-key index, which
    /// always exists for the lifetime of the table.
    pub fn new(num_columns: usize, key_column: usize, directory: &PageDirectory) -> Self {
        let mut manager = Self {
            indices: vec![None; num_columns],
            key_column,
        };
        manager
            .create_index(key_column, directory)
            .expect("primary key column must be in bounds");
        manager
    }

    pub fn locate(&self, column: usize, value: i64) -> Vec<Rid> {
        match self.indices.get(column).and_then(Option::as_ref) {
            Some(tree) => tree.find(value).into_iter().map(Rid::from_raw).collect(),
            None => Vec::new(),
        }
    }

    pub fn locate_range(&self, lo: i64, hi: i64, column: usize) -> Vec<Rid> {
        match self.indices.get(column).and_then(Option::as_ref) {
            Some(tree) => tree
                .find_range(lo, hi)
                .into_iter()
                .map(Rid::from_raw)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn add(&mut self, rid: Rid, columns: &[i64]) {
        for (column, tree) in self.indices.iter_mut().enumerate() {
            let Some(tree) = tree else { continue };
            let value = columns[column];
            if value == NULL {
                continue;
            }
            tree.insert(value, rid.as_raw());
        }
    }

    pub fn remove(&mut self, rid: Rid, columns: &[i64]) {
        for (column, tree) in self.indices.iter_mut().enumerate() {
            let Some(tree) = tree else { continue };
            let value = columns[column];
            if value == NULL {
                continue;
            }
            tree.remove(value, Some(rid.as_raw()));
        }
    }

    pub fn update(&mut self, rid: Rid, old_values: &[i64], new_values: &[i64]) {
        for (column, tree) in self.indices.iter_mut().enumerate() {
            let Some(tree) = tree else { continue };
            let old = old_values[column];
            let new = new_values[column];
            if old == new || old == NULL || new == NULL {
                continue;
            }
            tree.remove(old, Some(rid.as_raw()));
            tree.insert(new, rid.as_raw());
        }
    }

    pub fn create_index(&mut self, column: usize, directory: &PageDirectory) -> Result<bool> {
        if column >= self.indices.len() {
            return Err(Error::InvalidColumn(column));
        }
        if self.indices[column].is_some() {
            return Ok(false);
        }
        let mut tree = BTree::new();
        for (rid, record) in directory.iter_base_records() {
            let value = record[crate::BASE_META + column];
            if value != NULL {
                tree.insert(value, rid.as_raw());
            }
        }
        self.indices[column] = Some(tree);
        debug!(column, "index created");
        Ok(true)
    }

    pub fn drop_index(&mut self, column: usize) -> bool {
        if column == self.key_column {
            warn!(column, "refusing to drop primary key index");
            return false;
        }
        match self.indices.get_mut(column) {
            Some(slot @ Some(_)) => {
                *slot = None;
                debug!(column, "index dropped");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BASE_META, NULL as N};

    fn base_record(data: &[i64]) -> Vec<i64> {
        let mut record = vec![N; BASE_META];
        record.extend_from_slice(data);
        record
    }

    #[test]
    fn primary_key_index_exists_from_construction() {
        let mut dir = PageDirectory::new(2);
        let rid = dir.add_record(&base_record(&[5, 50]), false, None).unwrap();
        let manager = IndexManager::new(2, 0, &dir);
        assert_eq!(manager.locate(0, 5), vec![rid]);
    }

    #[test]
    fn create_index_bulk_loads_existing_rows() {
        let mut dir = PageDirectory::new(2);
        let r1 = dir.add_record(&base_record(&[1, 100]), false, None).unwrap();
        let r2 = dir.add_record(&base_record(&[2, 100]), false, None).unwrap();
        let mut manager = IndexManager::new(2, 0, &dir);
        assert!(manager.create_index(1, &dir).unwrap());
        let mut found = manager.locate(1, 100);
        found.sort();
        let mut expected = vec![r1, r2];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn create_index_rejects_out_of_bounds_column() {
        let dir = PageDirectory::new(2);
        let mut manager = IndexManager::new(2, 0, &dir);
        assert!(matches!(
            manager.create_index(5, &dir),
            Err(Error::InvalidColumn(5))
        ));
    }

    #[test]
    fn drop_index_protects_primary_key() {
        let dir = PageDirectory::new(2);
        let mut manager = IndexManager::new(2, 0, &dir);
        assert!(!manager.drop_index(0));
    }

    #[test]
    fn update_skips_unchanged_and_null_columns() {
        let mut dir = PageDirectory::new(2);
        let rid = dir.add_record(&base_record(&[1, 10]), false, None).unwrap();
        let mut manager = IndexManager::new(2, 0, &dir);
        manager.create_index(1, &dir).unwrap();
        manager.update(rid, &[1, 10], &[1, 20]);
        assert_eq!(manager.locate(1, 10), Vec::<Rid>::new());
        assert_eq!(manager.locate(1, 20), vec![rid]);
    }
}
