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

// Document blob codec. The byte layout is private to the store; all that
// matters is full fidelity on every attribute-value variant.

use crate::error::EngineError;
use crate::types::Item;

pub(crate) fn serialize_item(item: &Item) -> Result<Vec<u8>, EngineError> {
    Ok(bincode::serialize(item)?)
}

pub(crate) fn deserialize_item(bytes: &[u8]) -> Result<Item, EngineError> {
    Ok(bincode::deserialize(bytes)?)
}
