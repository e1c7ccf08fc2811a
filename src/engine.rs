/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 *
 * Licensed under the Apache License, Version 2.0 (the "License").
 * You may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

// The KV engine boundary. redb provides snapshot-isolated read transactions,
// serializable write transactions, and ordered range iteration; this module
// adapts that to the View/Update shape the operation handlers consume.
// Every logical row lives in one redb table; keys already carry their
// table-name prefix.

use std::ops::Bound;
use std::path::Path;

use log::debug;
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};

use crate::cancel::Cancellation;
use crate::error::{EngineError, StoreError};

const ROWS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rows");

pub struct Engine {
    db: Database,
}

impl Engine {
    /// Open (or create) an on-disk engine.
    pub fn open(path: impl AsRef<Path>) -> Result<Engine, EngineError> {
        let path = path.as_ref();
        let db = Database::create(path)?;
        debug!("opened engine at {}", path.display());
        Engine::with_database(db)
    }

    /// Open a fresh in-memory engine. Used by tests and ephemeral stores.
    pub fn open_in_memory() -> Result<Engine, EngineError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        debug!("opened in-memory engine");
        Engine::with_database(db)
    }

    fn with_database(db: Database) -> Result<Engine, EngineError> {
        // Make sure the row table exists so read transactions can open it.
        let txn = db.begin_write()?;
        txn.open_table(ROWS)?;
        txn.commit()?;
        Ok(Engine { db })
    }

    /// Run `f` under a read snapshot.
    pub(crate) fn view<R>(
        &self,
        cancel: &Cancellation,
        f: impl FnOnce(&Snapshot) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        cancel.check()?;
        let txn = self.db.begin_read().map_err(EngineError::from)?;
        let table = txn.open_table(ROWS).map_err(EngineError::from)?;
        f(&Snapshot { table })
    }

    /// Run `f` under a serializable write transaction; commit iff it
    /// succeeds and the cancellation handle has not fired.
    pub(crate) fn update<R>(
        &self,
        cancel: &Cancellation,
        f: impl FnOnce(&mut WriteTxn) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        cancel.check()?;
        let txn = self.db.begin_write().map_err(EngineError::from)?;
        let result = {
            match txn.open_table(ROWS) {
                Ok(table) => {
                    let mut write = WriteTxn { table };
                    f(&mut write)
                }
                Err(err) => Err(EngineError::from(err).into()),
            }
        };
        match result.and_then(|value| cancel.check().map(|_| value)) {
            Ok(value) => {
                txn.commit().map_err(EngineError::from)?;
                Ok(value)
            }
            Err(err) => {
                // The abort error, if any, is secondary to the handler's.
                let _ = txn.abort();
                Err(err)
            }
        }
    }
}

/// A read snapshot over the row table.
pub(crate) struct Snapshot {
    table: redb::ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl Snapshot {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Ordered iteration over `[start, end)` bounds, forward or reverse.
    pub fn range(
        &self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        reverse: bool,
    ) -> Result<KeyRange, EngineError> {
        let start_ref = bound_as_slice(&start);
        let end_ref = bound_as_slice(&end);
        let inner = self.table.range::<&[u8]>((start_ref, end_ref))?;
        Ok(KeyRange { inner, reverse })
    }
}

fn bound_as_slice(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// A double-ended row iterator. `reverse` flips traversal direction; keys
/// and values are copied out of the storage guards.
pub(crate) struct KeyRange {
    inner: redb::Range<'static, &'static [u8], &'static [u8]>,
    reverse: bool,
}

impl Iterator for KeyRange {
    type Item = Result<(Vec<u8>, Vec<u8>), EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = if self.reverse {
            self.inner.next_back()
        } else {
            self.inner.next()
        };
        step.map(|entry| {
            entry
                .map(|(key, value)| (key.value().to_vec(), value.value().to_vec()))
                .map_err(EngineError::from)
        })
    }
}

/// A serializable write transaction over the row table.
pub(crate) struct WriteTxn<'txn> {
    table: redb::Table<'txn, &'static [u8], &'static [u8]>,
}

impl WriteTxn<'_> {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.table.insert(key, value)?;
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), EngineError> {
        self.table.remove(key)?;
        Ok(())
    }
}
