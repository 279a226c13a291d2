//! Owns base/tail segments per range, the RID codec, and the lineage walk
//! that reconstructs a row's current or historical value.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::page::Page;
use crate::rid::{Rid, Segment};
use crate::{
    BASE_META, DELETED, IDX_BASE_RID, IDX_INDIRECTION, IDX_RID, IDX_SCHEMA_ENCODING,
    IDX_TIMESTAMP, NULL, RECORDS_PER_RANGE, SLOTS_PER_PAGE, TAIL_META,
};

/// A co-indexed run of physical pages: one page per meta+data column,
/// all advancing their append cursor together.
struct LogicalPage {
    columns: Vec<Page>,
}

impl LogicalPage {
    fn new(width: usize) -> Self {
        Self {
            columns: (0..width).map(|_| Page::new()).collect(),
        }
    }

    fn append_record(&mut self, values: &[i64]) -> usize {
        let mut slot = None;
        for (page, value) in self.columns.iter_mut().zip(values) {
            let s = page.append(*value).expect("logical page column overflow");
            slot = Some(s);
        }
        slot.expect("logical page has at least one column")
    }

    fn read_record(&self, slot: usize) -> Result<Vec<i64>> {
        self.columns.iter().map(|page| page.read(slot)).collect()
    }

    fn write_meta_slot(&mut self, col: usize, slot: usize, value: i64) -> Result<()> {
        self.columns[col].write_slot(slot, value)
    }
}

struct RangeState {
    base_pages: Vec<LogicalPage>,
    tail_pages: Vec<LogicalPage>,
    base_offset: u64,
    tail_offset: u64,
}

impl RangeState {
    fn new() -> Self {
        Self {
            base_pages: Vec::new(),
            tail_pages: Vec::new(),
            base_offset: 0,
            tail_offset: 0,
        }
    }
}

pub struct PageDirectory {
    num_columns: usize,
    ranges: Vec<RangeState>,
    num_base_records: u64,
    num_tail_records: u64,
}

impl PageDirectory {
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_columns,
            ranges: Vec::new(),
            num_base_records: 0,
            num_tail_records: 0,
        }
    }

    pub fn num_base_records(&self) -> u64 {
        self.num_base_records
    }

    fn base_width(&self) -> usize {
        BASE_META + self.num_columns
    }

    fn tail_width(&self) -> usize {
        TAIL_META + self.num_columns
    }

    fn ensure_range(&mut self, range_id: u64) {
        while (self.ranges.len() as u64) <= range_id {
            self.ranges.push(RangeState::new());
        }
    }

    fn ensure_page(pages: &mut Vec<LogicalPage>, page_index: usize, width: usize) {
        while pages.len() <= page_index {
            pages.push(LogicalPage::new(width));
        }
    }

    /// Inserts a base or tail record. `columns` must already be shaped as
    /// `[meta...] ++ data[0..C)`; the meta slots are overwritten here and
    /// their incoming values are ignored.
    pub fn add_record(&mut self, columns: &[i64], is_tail: bool, base_rid: Option<Rid>) -> Result<Rid> {
        let expected = if is_tail {
            self.tail_width()
        } else {
            self.base_width()
        };
        if columns.len() != expected {
            return Err(Error::SchemaMismatch {
                expected,
                got: columns.len(),
            });
        }

        let (range_id, offset) = if is_tail {
            let base_rid = base_rid.expect("tail insert requires a base rid");
            let range_id = base_rid.range_id();
            self.ensure_range(range_id);
            let range = &self.ranges[range_id as usize];
            if range.tail_offset >= RECORDS_PER_RANGE as u64 {
                warn!(range_id, "tail range full");
                return Err(Error::TailRangeFull { range_id });
            }
            (range_id, range.tail_offset)
        } else {
            let range_id = self.num_base_records / RECORDS_PER_RANGE as u64;
            self.ensure_range(range_id);
            let range = &self.ranges[range_id as usize];
            (range_id, range.base_offset)
        };

        let segment = if is_tail { Segment::Tail } else { Segment::Base };
        let rid = Rid::encode(range_id, segment, offset);

        let mut record = columns.to_vec();
        let now = timestamp_now();
        record[IDX_RID] = rid.as_raw();
        record[IDX_TIMESTAMP] = now;

        if is_tail {
            let base_rid = base_rid.expect("tail insert requires a base rid");
            let data_start = TAIL_META;
            let schema_encoding = bitmap_of_non_null(&record[data_start..]);
            record[IDX_SCHEMA_ENCODING] = schema_encoding;
            record[IDX_BASE_RID] = base_rid.as_raw();

            let base_indirection = self.get_record(base_rid)?[IDX_INDIRECTION];
            record[IDX_INDIRECTION] = if base_indirection == NULL {
                base_rid.as_raw()
            } else {
                base_indirection
            };
        } else {
            record[IDX_INDIRECTION] = NULL;
            record[IDX_SCHEMA_ENCODING] = 0;
        }

        let page_index = (offset as usize) / SLOTS_PER_PAGE;
        let width = if is_tail {
            self.tail_width()
        } else {
            self.base_width()
        };
        let range = &mut self.ranges[range_id as usize];
        let pages = if is_tail {
            &mut range.tail_pages
        } else {
            &mut range.base_pages
        };
        Self::ensure_page(pages, page_index, width);
        pages[page_index].append_record(&record);

        if is_tail {
            range.tail_offset += 1;
            self.num_tail_records += 1;
        } else {
            range.base_offset += 1;
            self.num_base_records += 1;
        }

        if is_tail {
            self.update_base_record(base_rid.expect("checked above"), rid, record[IDX_SCHEMA_ENCODING])?;
        }

        debug!(?rid, is_tail, "record inserted");
        Ok(rid)
    }

    /// Links `base_rid`'s indirection to the newest tail and folds the
    /// tail's schema encoding into the base's cumulative bitmap.
    fn update_base_record(&mut self, base_rid: Rid, tail_rid: Rid, tail_schema: i64) -> Result<()> {
        let (range_id, _, offset) = base_rid.decode();
        let page_index = (offset as usize) / SLOTS_PER_PAGE;
        let slot = (offset as usize) % SLOTS_PER_PAGE;
        let range = &mut self.ranges[range_id as usize];
        let page = &mut range.base_pages[page_index];
        let existing_schema = page.read_record(slot)?[IDX_SCHEMA_ENCODING];
        page.write_meta_slot(IDX_INDIRECTION, slot, tail_rid.as_raw())?;
        page.write_meta_slot(IDX_SCHEMA_ENCODING, slot, existing_schema | tail_schema)?;
        Ok(())
    }

    /// Raw record at `rid`, shaped per its own segment (base or tail).
    /// Fails with `RecordDeleted` if `rid` is a tombstoned base.
    pub fn get_record(&self, rid: Rid) -> Result<Vec<i64>> {
        let (range_id, segment, offset) = rid.decode();
        let page_index = (offset as usize) / SLOTS_PER_PAGE;
        let slot = (offset as usize) % SLOTS_PER_PAGE;
        let range = self
            .ranges
            .get(range_id as usize)
            .ok_or(Error::OutOfBounds { slot: page_index, len: 0 })?;
        let pages = match segment {
            Segment::Base => &range.base_pages,
            Segment::Tail => &range.tail_pages,
        };
        let page = pages
            .get(page_index)
            .ok_or(Error::OutOfBounds { slot, len: 0 })?;
        let record = page.read_record(slot)?;
        if segment == Segment::Base && record[IDX_INDIRECTION] == DELETED {
            return Err(Error::RecordDeleted(rid));
        }
        Ok(record)
    }

    /// The current logical value of the row rooted at `base_rid`, shaped
    /// like a tail record (`base_rid` slot echoes `base_rid` itself when
    /// there are no tails yet).
    pub fn get_cumulative_updated_record(&self, base_rid: Rid) -> Result<Vec<i64>> {
        let base = self.get_record(base_rid)?;
        let mut result = shape_as_tail(&base, base_rid, self.num_columns);

        let indirection = base[IDX_INDIRECTION];
        if indirection == NULL {
            return Ok(result);
        }

        let mut pending = base[IDX_SCHEMA_ENCODING];
        let mut cursor = Rid::from_raw(indirection);
        while pending != 0 && cursor != base_rid {
            let tail = self.get_raw_tail(cursor)?;
            for i in 0..self.num_columns {
                let bit = schema_bit(i, self.num_columns);
                if pending & bit != 0 {
                    let value = tail[TAIL_META + i];
                    if value != NULL {
                        result[TAIL_META + i] = value;
                        pending &= !bit;
                    }
                }
            }
            cursor = Rid::from_raw(tail[IDX_INDIRECTION]);
        }
        Ok(result)
    }

    /// The row's value after exactly a prefix of its tails has been
    /// applied, oldest first. See the internal version convention: `-1` is
    /// latest, `0` is base-only, `< -1` is "latest minus k".
    pub fn get_relative_version_of_record(&self, base_rid: Rid, version: i64) -> Result<Vec<i64>> {
        let base = self.get_record(base_rid)?;
        let shaped_base = shape_as_tail(&base, base_rid, self.num_columns);

        if version == 0 {
            return Ok(shaped_base);
        }
        if version == -1 {
            return self.get_cumulative_updated_record(base_rid);
        }

        let tails_oldest_first = self.collect_tail_chain(base_rid, base[IDX_INDIRECTION])?;
        let len = tails_oldest_first.len();
        let take = if version < -1 {
            let k = (-1 - version) as usize;
            len.saturating_sub(k)
        } else {
            (version as usize).min(len)
        };

        let mut result = shaped_base;
        for tail in &tails_oldest_first[..take] {
            for i in 0..self.num_columns {
                let value = tail[TAIL_META + i];
                if value != NULL {
                    result[TAIL_META + i] = value;
                }
            }
        }
        Ok(result)
    }

    /// Walks a row's indirection chain from newest to oldest and returns the
    /// tail records in oldest-first order.
    fn collect_tail_chain(&self, base_rid: Rid, base_indirection: i64) -> Result<Vec<Vec<i64>>> {
        let mut newest_first = Vec::new();
        if base_indirection == NULL {
            return Ok(newest_first);
        }
        let mut cursor = Rid::from_raw(base_indirection);
        loop {
            let tail = self.get_raw_tail(cursor)?;
            let prev = tail[IDX_INDIRECTION];
            newest_first.push(tail);
            if prev == NULL || Rid::from_raw(prev) == base_rid {
                break;
            }
            cursor = Rid::from_raw(prev);
        }
        newest_first.reverse();
        Ok(newest_first)
    }

    fn get_raw_tail(&self, rid: Rid) -> Result<Vec<i64>> {
        let (range_id, _, offset) = rid.decode();
        let page_index = (offset as usize) / SLOTS_PER_PAGE;
        let slot = (offset as usize) % SLOTS_PER_PAGE;
        let range = &self.ranges[range_id as usize];
        range.tail_pages[page_index].read_record(slot)
    }

    /// Tombstones the base row; idempotent, returns `false` for a RID
    /// outside allocated storage.
    pub fn delete_record(&mut self, rid: Rid) -> bool {
        let (range_id, _, offset) = rid.decode();
        let page_index = (offset as usize) / SLOTS_PER_PAGE;
        let slot = (offset as usize) % SLOTS_PER_PAGE;
        let Some(range) = self.ranges.get_mut(range_id as usize) else {
            return false;
        };
        let Some(page) = range.base_pages.get_mut(page_index) else {
            return false;
        };
        let Ok(record) = page.read_record(slot) else {
            return false;
        };
        if record[IDX_INDIRECTION] == DELETED {
            return true;
        }
        if page.write_meta_slot(IDX_INDIRECTION, slot, DELETED).is_err() {
            return false;
        }
        debug!(?rid, "record deleted");
        true
    }

    /// Iterates every live (non-tombstoned) base row, for index bulk-load.
    pub fn iter_base_records(&self) -> impl Iterator<Item = (Rid, Vec<i64>)> + '_ {
        (0..self.num_base_records).filter_map(move |n| {
            let range_id = n / RECORDS_PER_RANGE as u64;
            let offset = n % RECORDS_PER_RANGE as u64;
            let rid = Rid::encode(range_id, Segment::Base, offset);
            self.get_record(rid).ok().map(|record| (rid, record))
        })
    }
}

fn timestamp_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn schema_bit(column: usize, num_columns: usize) -> i64 {
    1i64 << (num_columns - 1 - column)
}

fn bitmap_of_non_null(data: &[i64]) -> i64 {
    let mut bitmap = 0i64;
    for (i, value) in data.iter().enumerate() {
        if *value != NULL {
            bitmap |= schema_bit(i, data.len());
        }
    }
    bitmap
}

fn shape_as_tail(base: &[i64], base_rid: Rid, num_columns: usize) -> Vec<i64> {
    let mut result = vec![0i64; TAIL_META + num_columns];
    result[IDX_INDIRECTION] = base[IDX_INDIRECTION];
    result[IDX_RID] = base[IDX_RID];
    result[IDX_TIMESTAMP] = base[IDX_TIMESTAMP];
    result[IDX_SCHEMA_ENCODING] = base[IDX_SCHEMA_ENCODING];
    result[IDX_BASE_RID] = base_rid.as_raw();
    result[TAIL_META..].copy_from_slice(&base[BASE_META..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record(num_columns: usize, data: &[i64]) -> Vec<i64> {
        let mut record = vec![NULL; BASE_META];
        record.extend_from_slice(data);
        assert_eq!(record.len(), BASE_META + num_columns);
        record
    }

    fn tail_record(num_columns: usize, data: &[Option<i64>]) -> Vec<i64> {
        let mut record = vec![NULL; TAIL_META];
        record.extend(data.iter().map(|v| v.unwrap_or(NULL)));
        assert_eq!(record.len(), TAIL_META + num_columns);
        record
    }

    #[test]
    fn insert_and_get_record_roundtrips() {
        let mut dir = PageDirectory::new(3);
        let rid = dir
            .add_record(&base_record(3, &[10, 20, 30]), false, None)
            .unwrap();
        let record = dir.get_record(rid).unwrap();
        assert_eq!(&record[BASE_META..], &[10, 20, 30]);
        assert_eq!(record[IDX_RID], rid.as_raw());
    }

    #[test]
    fn no_tails_cumulative_matches_base() {
        let mut dir = PageDirectory::new(3);
        let rid = dir
            .add_record(&base_record(3, &[1, 2, 3]), false, None)
            .unwrap();
        let cumulative = dir.get_cumulative_updated_record(rid).unwrap();
        assert_eq!(&cumulative[TAIL_META..], &[1, 2, 3]);
    }

    #[test]
    fn update_reflects_in_cumulative_and_version() {
        let mut dir = PageDirectory::new(3);
        let base_rid = dir
            .add_record(&base_record(3, &[1, 2, 3]), false, None)
            .unwrap();
        dir.add_record(
            &tail_record(3, &[Some(9), None, None]),
            true,
            Some(base_rid),
        )
        .unwrap();

        let latest = dir.get_cumulative_updated_record(base_rid).unwrap();
        assert_eq!(&latest[TAIL_META..], &[9, 2, 3]);

        let one_back = dir.get_relative_version_of_record(base_rid, 0).unwrap();
        assert_eq!(&one_back[TAIL_META..], &[1, 2, 3]);
    }

    #[test]
    fn delete_tombstones_and_is_idempotent() {
        let mut dir = PageDirectory::new(2);
        let rid = dir.add_record(&base_record(2, &[1, 2]), false, None).unwrap();
        assert!(dir.delete_record(rid));
        assert!(matches!(dir.get_record(rid), Err(Error::RecordDeleted(_))));
        assert!(dir.delete_record(rid));
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let mut dir = PageDirectory::new(3);
        let err = dir.add_record(&[NULL; 4], false, None).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }

    #[test]
    fn tail_range_full_is_reported() {
        let mut dir = PageDirectory::new(1);
        let base_rid = dir.add_record(&base_record(1, &[0]), false, None).unwrap();
        for _ in 0..RECORDS_PER_RANGE {
            dir.add_record(&tail_record(1, &[Some(1)]), true, Some(base_rid))
                .unwrap();
        }
        let err = dir
            .add_record(&tail_record(1, &[Some(1)]), true, Some(base_rid))
            .unwrap_err();
        assert!(matches!(err, Error::TailRangeFull { .. }));
    }

    #[test]
    fn second_range_spans_correctly() {
        let mut dir = PageDirectory::new(1);
        let mut last_rid = None;
        for i in 0..(2 * RECORDS_PER_RANGE) {
            last_rid = Some(dir.add_record(&base_record(1, &[i as i64]), false, None).unwrap());
        }
        let span_rid = Rid::encode(1, Segment::Base, 0);
        let record = dir.get_record(span_rid).unwrap();
        assert_eq!(record[IDX_RID], span_rid.as_raw());
        assert_eq!(last_rid.unwrap().range_id(), 1);
    }
}
