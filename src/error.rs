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

use std::error::Error;
use std::fmt;

/// Errors surfaced by the store API. Every handler aborts its transaction on
/// any of these; nothing is retried internally.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed request: missing required field, wrong attribute type,
    /// unknown table or index, unparseable expression, reserved word used
    /// without an alias, and so on.
    Validation(String),
    /// A ConditionExpression evaluated to false against the item's pre-image.
    ConditionCheckFailed,
    /// TransactWriteItems aborted. Carries the index of the first item whose
    /// condition failed; no writes occurred.
    TransactionCanceled { index: usize },
    /// GetItem addressed a key that does not exist.
    NotFound,
    /// The caller-supplied cancellation handle fired.
    Cancelled,
    /// The KV engine failed. The enclosing transaction is rolled back.
    Engine(EngineError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Validation(msg) => {
                write!(f, "validation error: {}", msg)
            }
            StoreError::ConditionCheckFailed => {
                write!(f, "the conditional request failed")
            }
            StoreError::TransactionCanceled { index } => {
                write!(
                    f,
                    "transaction canceled: condition check failed for item at index {}",
                    index
                )
            }
            StoreError::NotFound => {
                write!(f, "the requested item does not exist")
            }
            StoreError::Cancelled => {
                write!(f, "the operation was cancelled by the caller")
            }
            StoreError::Engine(err) => {
                write!(f, "storage engine error: {}", err)
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for StoreError {
    fn from(err: EngineError) -> Self {
        StoreError::Engine(err)
    }
}

/// Failures raised at the KV engine boundary: redb itself, or a stored value
/// blob that no longer deserializes.
#[derive(Debug)]
pub enum EngineError {
    Transaction(redb::TransactionError),
    Table(redb::TableError),
    Storage(redb::StorageError),
    Commit(redb::CommitError),
    Database(redb::DatabaseError),
    /// A stored row failed to serialize or deserialize.
    Codec(bincode::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Transaction(err) => write!(f, "transaction error: {}", err),
            EngineError::Table(err) => write!(f, "table error: {}", err),
            EngineError::Storage(err) => write!(f, "storage error: {}", err),
            EngineError::Commit(err) => write!(f, "commit error: {}", err),
            EngineError::Database(err) => write!(f, "database error: {}", err),
            EngineError::Codec(err) => write!(f, "value codec error: {}", err),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Transaction(err) => Some(err),
            EngineError::Table(err) => Some(err),
            EngineError::Storage(err) => Some(err),
            EngineError::Commit(err) => Some(err),
            EngineError::Database(err) => Some(err),
            EngineError::Codec(err) => Some(err),
        }
    }
}

impl From<redb::TransactionError> for EngineError {
    fn from(err: redb::TransactionError) -> Self {
        EngineError::Transaction(err)
    }
}

impl From<redb::TableError> for EngineError {
    fn from(err: redb::TableError) -> Self {
        EngineError::Table(err)
    }
}

impl From<redb::StorageError> for EngineError {
    fn from(err: redb::StorageError) -> Self {
        EngineError::Storage(err)
    }
}

impl From<redb::CommitError> for EngineError {
    fn from(err: redb::CommitError) -> Self {
        EngineError::Commit(err)
    }
}

impl From<redb::DatabaseError> for EngineError {
    fn from(err: redb::DatabaseError) -> Self {
        EngineError::Database(err)
    }
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        EngineError::Codec(err)
    }
}
