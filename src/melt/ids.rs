use crate::melt::plan::TableKind;
use std::collections::HashMap;

/// Hands out surrogate ids, one counter per table
///
/// Ids start at 1 and increase in the order rows are allocated. The
/// allocator belongs to a single run, so ids are only stable within it.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: HashMap<TableKind, u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, table: TableKind) -> u64 {
        let counter = self.next.entry(table).or_insert(1);
        let id = *counter;
        *counter += 1;
        id
    }
}
