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

// The expression subsystem: four independently parsed DynamoDB dialects
// sharing one grammar file, one path representation, and one evaluation
// context. Placeholders (#name / :value) stay symbolic in the ASTs and are
// resolved against the request's maps at evaluation time.

pub mod condition;
pub mod eval;
pub mod key_condition;
pub mod projection;
mod reserved;
pub mod update;

use std::fmt::{self, Display, Formatter};

use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::StoreError;

#[derive(Parser)]
#[grammar = "expression.pest"]
struct ExpressionParser;

pub(crate) use reserved::is_reserved_word;

/// An attribute path: a root followed by map-field and list-index steps.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Path {
    pub elements: Vec<PathElement>,
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum PathElement {
    /// A bare attribute name.
    Attribute(String),
    /// A `#name` alias, stored with its leading `#`.
    Alias(String),
    /// A `[n]` list index.
    Index(usize),
}

impl Path {
    fn new() -> Path {
        Path {
            elements: Vec::new(),
        }
    }

    fn add_attr(&mut self, attr: String) {
        self.elements.push(PathElement::Attribute(attr));
    }

    fn add_alias(&mut self, alias: String) {
        self.elements.push(PathElement::Alias(alias));
    }

    fn add_index(&mut self, index: usize) {
        self.elements.push(PathElement::Index(index));
    }

    /// The root element. Paths are non-empty by construction.
    pub fn root(&self) -> &PathElement {
        &self.elements[0]
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Attribute(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathElement::Alias(alias) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(alias)?;
                }
                PathElement::Index(index) => {
                    write!(f, "[{}]", index)?;
                }
            }
        }
        Ok(())
    }
}

/// A reference to a single attribute name: either bare or aliased.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NameRef {
    Name(String),
    Alias(String),
}

/// Convert a pest failure into the caller-visible validation error.
fn parse_failure(err: pest::error::Error<Rule>) -> StoreError {
    StoreError::Validation(format!("invalid expression: {}", err))
}

/// Walk a `path` pair into a `Path`, rejecting reserved bare identifiers.
fn build_path(pair: Pair<Rule>) -> Result<Path, StoreError> {
    assert_eq!(pair.as_rule(), Rule::path);
    let mut path = Path::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::path_name => build_path_name(part, &mut path)?,
            Rule::path_step => {
                // this unwrap is safe because path_step has exactly one child
                let step = part.into_inner().next().unwrap();
                match step.as_rule() {
                    Rule::path_name => build_path_name(step, &mut path)?,
                    Rule::list_index => {
                        let digits = step.as_str();
                        let index = digits[1..digits.len() - 1].parse::<usize>().map_err(|_| {
                            StoreError::Validation(format!("invalid list index '{}'", digits))
                        })?;
                        path.add_index(index);
                    }
                    _ => {
                        // this must not happen
                        unreachable!("unexpected element in path step");
                    }
                }
            }
            _ => {
                // this must not happen
                unreachable!("unexpected element in path");
            }
        }
    }
    Ok(path)
}

fn build_path_name(pair: Pair<Rule>, path: &mut Path) -> Result<(), StoreError> {
    // this unwrap is safe because path_name has exactly one child
    let name = pair.into_inner().next().unwrap();
    match name.as_rule() {
        Rule::identifier => {
            let text = name.as_str();
            if is_reserved_word(text) {
                return Err(StoreError::Validation(format!(
                    "attribute name '{}' is a reserved word; use an expression attribute name",
                    text
                )));
            }
            path.add_attr(text.to_owned());
            Ok(())
        }
        Rule::name_alias => {
            path.add_alias(name.as_str().to_owned());
            Ok(())
        }
        _ => {
            // this must not happen
            unreachable!("unexpected element in path name");
        }
    }
}

/// Walk a `key_operand` pair (bare identifier or alias, no nesting).
fn build_name_ref(pair: Pair<Rule>) -> Result<NameRef, StoreError> {
    assert_eq!(pair.as_rule(), Rule::key_operand);
    // this unwrap is safe because key_operand has exactly one child
    let name = pair.into_inner().next().unwrap();
    match name.as_rule() {
        Rule::identifier => {
            let text = name.as_str();
            if is_reserved_word(text) {
                return Err(StoreError::Validation(format!(
                    "attribute name '{}' is a reserved word; use an expression attribute name",
                    text
                )));
            }
            Ok(NameRef::Name(text.to_owned()))
        }
        Rule::name_alias => Ok(NameRef::Alias(name.as_str().to_owned())),
        _ => {
            // this must not happen
            unreachable!("unexpected element in key operand");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pest::Parser;

    fn parse_one_path(input: &str) -> Result<Path, StoreError> {
        let mut pairs =
            ExpressionParser::parse(Rule::projection_expression, input).map_err(parse_failure)?;
        // this unwrap is safe because a successful parse has one root
        let root = pairs.next().unwrap();
        let pair = root.into_inner().next().unwrap();
        build_path(pair)
    }

    #[test]
    fn test_path_parsing() {
        let path = parse_one_path("a.b[2].c[0][1]").unwrap();
        assert_eq!(
            path.elements,
            vec![
                PathElement::Attribute("a".to_owned()),
                PathElement::Attribute("b".to_owned()),
                PathElement::Index(2),
                PathElement::Attribute("c".to_owned()),
                PathElement::Index(0),
                PathElement::Index(1),
            ]
        );
        assert_eq!(path.to_string(), "a.b[2].c[0][1]");
    }

    #[test]
    fn test_alias_paths_skip_reserved_check() {
        let path = parse_one_path("#name.inner").unwrap();
        assert_eq!(
            path.elements,
            vec![
                PathElement::Alias("#name".to_owned()),
                PathElement::Attribute("inner".to_owned()),
            ]
        );
    }

    #[test]
    fn test_reserved_words_rejected() {
        assert!(parse_one_path("name").is_err());
        assert!(parse_one_path("a.size").is_err());
        assert!(parse_one_path("counter").is_ok());
    }
}
