//! Id-indexed record tables.
//!
//! Pooled data kinds usually hold every row of one table. [`RecordTable`]
//! stores the rows in order and builds an id → row index once, at
//! construction time.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::warn;

use crate::Result;
use crate::pool::{Pooled, PooledObject};

/// A row with a lookup id.
pub trait Record: Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Debug + Send + Sync;

    fn id(&self) -> Self::Id;
}

/// Rows of one table plus an id index.
#[derive(Debug, Clone)]
pub struct RecordTable<R: Record> {
    name: &'static str,
    rows: Vec<R>,
    index: HashMap<R::Id, usize>,
}

impl<R: Record> RecordTable<R> {
    /// Index `rows` by id. When two rows share an id the later one wins.
    pub fn new(name: &'static str, rows: Vec<R>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            index.insert(row.id(), idx);
        }
        Self { name, rows, index }
    }

    /// Look up a row by id.
    ///
    /// An unknown id is logged and reported as `None`; it is expected
    /// for bad caller input and never an error.
    pub fn get(&self, id: R::Id) -> Option<&R> {
        match self.index.get(&id) {
            Some(&idx) => self.rows.get(idx),
            None => {
                warn!(table = self.name, ?id, "record not found");
                None
            }
        }
    }

    /// Whether a row with `id` exists. Does not log.
    pub fn contains(&self, id: R::Id) -> bool {
        self.index.contains_key(&id)
    }

    /// All rows in source order.
    pub fn all(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T, R> Pooled<T>
where
    T: PooledObject<Data = RecordTable<R>>,
    R: Record,
{
    /// Look up one record, constructing the table on first use.
    pub fn record(&self, id: R::Id) -> Result<Option<&R>> {
        Ok(self.data()?.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row {
        id: i32,
        label: &'static str,
    }

    impl Record for Row {
        type Id = i32;

        fn id(&self) -> i32 {
            self.id
        }
    }

    fn table() -> RecordTable<Row> {
        RecordTable::new(
            "rows",
            vec![
                Row { id: 1, label: "one" },
                Row { id: 8, label: "eight" },
                Row { id: 1, label: "uno" },
            ],
        )
    }

    #[test]
    fn lookup_by_id() {
        let table = table();
        assert_eq!(table.get(8).map(|r| r.label), Some("eight"));
        assert!(table.contains(8));
    }

    #[test]
    fn later_duplicate_wins() {
        assert_eq!(table().get(1).map(|r| r.label), Some("uno"));
    }

    #[test]
    fn missing_id_is_none() {
        let table = table();
        assert!(table.get(42).is_none());
        assert!(!table.contains(42));
    }

    #[test]
    fn all_keeps_source_order() {
        let table = table();
        assert_eq!(table.len(), 3);
        let ids: Vec<i32> = table.all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 8, 1]);
        assert_eq!(table.name(), "rows");
    }
}
