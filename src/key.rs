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

// Key schema types and the table registry. Tables are declared when the
// store is opened and are immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{AttrVal, Item};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Key {
    pub name: String,
    /// Data type of the primary key. i.e. "S" (String), "N" (Number), or "B" (Binary).
    /// Use 'kind' as 'type' is a keyword in Rust.
    pub kind: KeyType,
}

impl Key {
    pub fn new(name: impl Into<String>, kind: KeyType) -> Key {
        Key {
            name: name.into(),
            kind,
        }
    }

    /// return String with "<pk name> (<pk type>)", e.g. "myPk (S)".
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.kind)
    }
}

/// Restrict acceptable DynamoDB data types for primary keys.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Copy, Clone)]
pub enum KeyType {
    S,
    N,
    B,
}

impl KeyType {
    /// Whether the given attribute value has this key's scalar type.
    pub fn matches(&self, value: &AttrVal) -> bool {
        matches!(
            (self, value),
            (KeyType::S, AttrVal::S(_)) | (KeyType::N, AttrVal::N(_)) | (KeyType::B, AttrVal::B(_))
        )
    }
}

/// implement Display for KeyType to simply print a single letter "S", "N", or "B".
impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                KeyType::S => "S",
                KeyType::N => "N",
                KeyType::B => "B",
            }
        )
    }
}

#[derive(Debug, PartialEq)]
pub struct ParseKeyTypeError {
    message: String,
}

impl std::error::Error for ParseKeyTypeError {}

impl fmt::Display for ParseKeyTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.message)
    }
}

impl ParseKeyTypeError {
    pub fn new(input: &str) -> Self {
        Self {
            message: format!("Not a valid DynamoDB primary key type: {}", input),
        }
    }
}

impl FromStr for KeyType {
    type Err = ParseKeyTypeError;

    fn from_str(s: &str) -> Result<Self, ParseKeyTypeError> {
        match s {
            "S" => Ok(Self::S),
            "N" => Ok(Self::N),
            "B" => Ok(Self::B),
            x => Err(ParseKeyTypeError::new(x)),
        }
    }
}

/// A composite primary key: required partition key, optional sort key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PrimaryKeyDefinition {
    pub partition: Key,
    pub sort: Option<Key>,
}

impl PrimaryKeyDefinition {
    pub fn new(partition: Key, sort: Option<Key>) -> PrimaryKeyDefinition {
        PrimaryKeyDefinition { partition, sort }
    }

    /// Pull the typed key values out of an item, validating presence and kind.
    pub fn extract(&self, item: &Item) -> Result<KeyValues, StoreError> {
        let partition = self.extract_one(item, &self.partition)?;
        let sort = match &self.sort {
            Some(sk) => Some(self.extract_one(item, sk)?),
            None => None,
        };
        Ok(KeyValues { partition, sort })
    }

    /// Like `extract`, but absence or a kind mismatch yields None instead of
    /// an error. Used to decide whether an item projects into a GSI.
    pub fn extract_optional(&self, item: &Item) -> Option<KeyValues> {
        let partition = item.get(&self.partition.name)?;
        if !self.partition.kind.matches(partition) {
            return None;
        }
        let sort = match &self.sort {
            Some(sk) => {
                let value = item.get(&sk.name)?;
                if !sk.kind.matches(value) {
                    return None;
                }
                Some(value.clone())
            }
            None => None,
        };
        Some(KeyValues {
            partition: partition.clone(),
            sort,
        })
    }

    fn extract_one(&self, item: &Item, key: &Key) -> Result<AttrVal, StoreError> {
        let value = item.get(&key.name).ok_or_else(|| {
            StoreError::Validation(format!("missing key attribute '{}'", key.name))
        })?;
        if key.kind.matches(value) {
            Ok(value.clone())
        } else {
            Err(StoreError::Validation(format!(
                "key attribute '{}' must be of type {}, got {}",
                key.name,
                key.kind,
                value.attribute_type()
            )))
        }
    }

    /// Whether the named attribute is one of the key attributes.
    pub fn contains_attribute(&self, name: &str) -> bool {
        self.partition.name == name || self.sort.as_ref().map(|k| k.name.as_str()) == Some(name)
    }
}

/// The typed values of a composite key, as extracted from an item.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValues {
    pub partition: AttrVal,
    pub sort: Option<AttrVal>,
}

/// A Global Secondary Index: a name plus its own key definition. Only
/// ALL-projection indexes exist; every GSI row stores the full base item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GsiDefinition {
    pub index_name: String,
    pub key: PrimaryKeyDefinition,
}

impl GsiDefinition {
    pub fn new(index_name: impl Into<String>, key: PrimaryKeyDefinition) -> GsiDefinition {
        GsiDefinition {
            index_name: index_name.into(),
            key,
        }
    }
}

/// One table's full schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub key: PrimaryKeyDefinition,
    /// Attribute holding the item's expiry epoch. Stored, never swept.
    pub ttl_attribute: Option<String>,
    pub indexes: Vec<GsiDefinition>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, key: PrimaryKeyDefinition) -> TableDefinition {
        TableDefinition {
            name: name.into(),
            key,
            ttl_attribute: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: GsiDefinition) -> TableDefinition {
        self.indexes.push(index);
        self
    }

    pub fn with_ttl_attribute(mut self, attribute: impl Into<String>) -> TableDefinition {
        self.ttl_attribute = Some(attribute.into());
        self
    }

    /// Resolve a named GSI on this table.
    pub fn index(&self, index_name: &str) -> Result<&GsiDefinition, StoreError> {
        self.indexes
            .iter()
            .find(|gsi| gsi.index_name == index_name)
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "no index named '{}' on table '{}'",
                    index_name, self.name
                ))
            })
    }
}

/// All table definitions, fixed at store creation.
#[derive(Debug)]
pub struct TableRegistry {
    tables: HashMap<String, TableDefinition>,
}

impl TableRegistry {
    pub fn new(definitions: Vec<TableDefinition>) -> Result<TableRegistry, StoreError> {
        let mut tables = HashMap::with_capacity(definitions.len());
        for def in definitions {
            if def.name.is_empty() {
                return Err(StoreError::Validation(
                    "table name must not be empty".to_owned(),
                ));
            }
            let mut seen = Vec::with_capacity(def.indexes.len());
            for gsi in &def.indexes {
                if gsi.index_name.is_empty() {
                    return Err(StoreError::Validation(
                        "index name must not be empty".to_owned(),
                    ));
                }
                if seen.contains(&&gsi.index_name) {
                    return Err(StoreError::Validation(format!(
                        "duplicate index '{}' on table '{}'",
                        gsi.index_name, def.name
                    )));
                }
                seen.push(&gsi.index_name);
            }
            if tables.insert(def.name.clone(), def).is_some() {
                return Err(StoreError::Validation(
                    "duplicate table definition".to_owned(),
                ));
            }
        }
        Ok(TableRegistry { tables })
    }

    pub fn get(&self, table_name: &str) -> Result<&TableDefinition, StoreError> {
        self.tables.get(table_name).ok_or_else(|| {
            StoreError::Validation(format!("table '{}' does not exist", table_name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableDefinition {
        TableDefinition::new(
            "users",
            PrimaryKeyDefinition::new(
                Key::new("pk", KeyType::S),
                Some(Key::new("sk", KeyType::N)),
            ),
        )
    }

    #[test]
    fn test_key_type_from_str() {
        assert_eq!(KeyType::from_str("S").unwrap(), KeyType::S);
        assert_eq!(KeyType::from_str("N").unwrap(), KeyType::N);
        assert_eq!(KeyType::from_str("B").unwrap(), KeyType::B);
        assert!(KeyType::from_str("X").is_err());
    }

    #[test]
    fn test_extract_validates_kinds() {
        let table = users_table();
        let mut item = Item::new();
        item.insert("pk".to_owned(), AttrVal::S("a".to_owned()));
        item.insert("sk".to_owned(), AttrVal::S("not a number".to_owned()));
        assert!(table.key.extract(&item).is_err());

        item.insert("sk".to_owned(), AttrVal::N("1".to_owned()));
        let values = table.key.extract(&item).unwrap();
        assert_eq!(values.partition, AttrVal::S("a".to_owned()));
        assert_eq!(values.sort, Some(AttrVal::N("1".to_owned())));
    }

    #[test]
    fn test_extract_optional_is_lenient() {
        let gsi = PrimaryKeyDefinition::new(Key::new("gpk", KeyType::S), None);
        let mut item = Item::new();
        assert!(gsi.extract_optional(&item).is_none());

        item.insert("gpk".to_owned(), AttrVal::N("5".to_owned()));
        assert!(gsi.extract_optional(&item).is_none());

        item.insert("gpk".to_owned(), AttrVal::S("x".to_owned()));
        assert!(gsi.extract_optional(&item).is_some());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        assert!(TableRegistry::new(vec![users_table(), users_table()]).is_err());

        let gsi_key = PrimaryKeyDefinition::new(Key::new("gpk", KeyType::S), None);
        let table = users_table()
            .with_index(GsiDefinition::new("g", gsi_key.clone()))
            .with_index(GsiDefinition::new("g", gsi_key));
        assert!(TableRegistry::new(vec![table]).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TableRegistry::new(vec![users_table()]).unwrap();
        assert!(registry.get("users").is_ok());
        assert!(registry.get("missing").is_err());
    }
}
