//! Thin facade composing a `PageDirectory` and an `IndexManager` under a
//! single name, column count, and key column.

use crate::error::Result;
use crate::index::IndexManager;
use crate::page_directory::PageDirectory;
use crate::rid::Rid;

pub struct Table {
    pub name: String,
    pub num_columns: usize,
    pub key_column: usize,
    directory: PageDirectory,
    index: IndexManager,
}

impl Table {
    pub fn new(name: impl Into<String>, num_columns: usize, key_column: usize) -> Self {
        let directory = PageDirectory::new(num_columns);
        let index = IndexManager::new(num_columns, key_column, &directory);
        Self {
            name: name.into(),
            num_columns,
            key_column,
            directory,
            index,
        }
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut IndexManager {
        &mut self.index
    }

    pub fn insert_record(&mut self, columns: &[i64], is_tail: bool, base_rid: Option<Rid>) -> Result<Rid> {
        self.directory.add_record(columns, is_tail, base_rid)
    }

    pub fn get_record(&self, rid: Rid) -> Result<Vec<i64>> {
        self.directory.get_record(rid)
    }

    pub fn get_cumulative_updated_record(&self, base_rid: Rid) -> Result<Vec<i64>> {
        self.directory.get_cumulative_updated_record(base_rid)
    }

    pub fn get_relative_version_of_record(&self, base_rid: Rid, version: i64) -> Result<Vec<i64>> {
        self.directory.get_relative_version_of_record(base_rid, version)
    }

    pub fn delete_record(&mut self, rid: Rid) -> bool {
        self.directory.delete_record(rid)
    }

    pub fn create_index(&mut self, column: usize) -> Result<bool> {
        self.index.create_index(column, &self.directory)
    }

    pub fn drop_index(&mut self, column: usize) -> bool {
        self.index.drop_index(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BASE_META, NULL};

    fn base_record(num_columns: usize, data: &[i64]) -> Vec<i64> {
        let mut record = vec![NULL; BASE_META];
        record.extend_from_slice(data);
        assert_eq!(record.len(), BASE_META + num_columns);
        record
    }

    #[test]
    fn insert_is_immediately_readable() {
        let mut table = Table::new("grades", 2, 0);
        let rid = table
            .insert_record(&base_record(2, &[1, 99]), false, None)
            .unwrap();
        assert_eq!(&table.get_record(rid).unwrap()[BASE_META..], &[1, 99]);
    }

    #[test]
    fn create_index_on_secondary_column_bulk_loads() {
        let mut table = Table::new("grades", 2, 0);
        table.insert_record(&base_record(2, &[1, 99]), false, None).unwrap();
        table.insert_record(&base_record(2, &[2, 99]), false, None).unwrap();
        assert!(table.create_index(1).unwrap());
        assert_eq!(table.index().locate(1, 99).len(), 2);
    }
}
