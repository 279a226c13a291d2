//! Caller-facing operations over a `Table`: primary-key uniqueness, index
//! synchronization, and translation between the public relative-version
//! convention (`0` = latest, negative = further back, …) and the internal
//! one used by `PageDirectory::get_relative_version_of_record`.

use tracing::warn;

use crate::rid::Rid;
use crate::table::Table;
use crate::{NULL, TAIL_META};

pub struct Query {
    pub table: Table,
}

impl Query {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    fn translate_version(relative_version: i64) -> i64 {
        relative_version - 1
    }

    pub fn insert(&mut self, columns: &[i64]) -> bool {
        if columns.len() != self.table.num_columns {
            warn!(
                expected = self.table.num_columns,
                got = columns.len(),
                "insert: column count mismatch"
            );
            return false;
        }
        let mut full = vec![NULL; crate::BASE_META];
        full.extend_from_slice(columns);
        match self.table.insert_record(&full, false, None) {
            Ok(rid) => {
                self.table.index_mut().add(rid, columns);
                true
            }
            Err(err) => {
                warn!(%err, "insert failed");
                false
            }
        }
    }

    pub fn delete(&mut self, primary_key: i64) -> bool {
        let rids = self.table.index().locate(self.table.key_column, primary_key);
        if rids.is_empty() {
            return false;
        }
        let mut all_ok = true;
        for rid in rids {
            let Ok(record) = self.table.get_cumulative_updated_record(rid) else {
                all_ok = false;
                continue;
            };
            let data = record[TAIL_META..].to_vec();
            if !self.table.delete_record(rid) {
                all_ok = false;
                continue;
            }
            self.table.index_mut().remove(rid, &data);
        }
        all_ok
    }

    pub fn select(
        &self,
        search_key: i64,
        search_key_index: usize,
        projected_columns_index: &[u8],
    ) -> Vec<Vec<Option<i64>>> {
        self.select_at(search_key, search_key_index, projected_columns_index, -1)
    }

    pub fn select_version(
        &self,
        search_key: i64,
        search_key_index: usize,
        projected_columns_index: &[u8],
        relative_version: i64,
    ) -> Vec<Vec<Option<i64>>> {
        let internal = Self::translate_version(relative_version);
        self.select_at(search_key, search_key_index, projected_columns_index, internal)
    }

    fn select_at(
        &self,
        search_key: i64,
        search_key_index: usize,
        projected_columns_index: &[u8],
        internal_version: i64,
    ) -> Vec<Vec<Option<i64>>> {
        let rids = self.table.index().locate(search_key_index, search_key);
        if rids.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for rid in rids {
            let record = if internal_version == -1 {
                self.table.get_cumulative_updated_record(rid)
            } else {
                self.table.get_relative_version_of_record(rid, internal_version)
            };
            let Ok(record) = record else { continue };
            let data = &record[TAIL_META..TAIL_META + self.table.num_columns];
            let projected = (0..self.table.num_columns)
                .map(|i| {
                    if projected_columns_index[i] == 1 {
                        Some(data[i])
                    } else {
                        None
                    }
                })
                .collect();
            results.push(projected);
        }
        results
    }

    pub fn update(&mut self, primary_key: i64, new_columns: &[Option<i64>]) -> bool {
        let rids = self.table.index().locate(self.table.key_column, primary_key);
        if rids.is_empty() {
            return false;
        }
        let num_columns = self.table.num_columns;
        let mut all_ok = true;
        for rid in rids {
            let Ok(cumulative) = self.table.get_cumulative_updated_record(rid) else {
                all_ok = false;
                continue;
            };
            let old_data = cumulative[TAIL_META..TAIL_META + num_columns].to_vec();
            let mut tail_data = vec![NULL; num_columns];
            let mut new_data = old_data.clone();
            for i in 0..num_columns {
                if let Some(Some(v)) = new_columns.get(i) {
                    tail_data[i] = *v;
                    new_data[i] = *v;
                }
            }
            let mut full_tail = vec![NULL; TAIL_META];
            full_tail.extend_from_slice(&tail_data);
            match self.table.insert_record(&full_tail, true, Some(rid)) {
                Ok(_) => self.table.index_mut().update(rid, &old_data, &new_data),
                Err(err) => {
                    warn!(%err, "update failed");
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    pub fn sum(&self, start_range: i64, end_range: i64, aggregate_column_index: usize) -> i64 {
        self.sum_at(start_range, end_range, aggregate_column_index, -1)
    }

    pub fn sum_version(
        &self,
        start_range: i64,
        end_range: i64,
        aggregate_column_index: usize,
        relative_version: i64,
    ) -> i64 {
        let internal = Self::translate_version(relative_version);
        self.sum_at(start_range, end_range, aggregate_column_index, internal)
    }

    fn sum_at(
        &self,
        start_range: i64,
        end_range: i64,
        aggregate_column_index: usize,
        internal_version: i64,
    ) -> i64 {
        let rids: Vec<Rid> = self
            .table
            .index()
            .locate_range(start_range, end_range, self.table.key_column);
        let mut total = 0i64;
        for rid in rids {
            let record = if internal_version == -1 {
                self.table.get_cumulative_updated_record(rid)
            } else {
                self.table.get_relative_version_of_record(rid, internal_version)
            };
            if let Ok(record) = record {
                let value = record[TAIL_META + aggregate_column_index];
                if value != NULL {
                    total += value;
                }
            }
        }
        total
    }

    pub fn increment(&mut self, key: i64, column: usize) -> bool {
        let projection: Vec<u8> = (0..self.table.num_columns).map(|_| 1).collect();
        let results = self.select(key, self.table.key_column, &projection);
        let Some(row) = results.into_iter().next() else {
            return false;
        };
        let Some(current) = row[column] else {
            return false;
        };
        let mut patch = vec![None; self.table.num_columns];
        patch[column] = Some(current + 1);
        self.update(key, &patch)
    }
}
