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

// Attribute values: the tagged union stored at every document leaf, plus the
// input validation and set normalization applied on every write path.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter, Write};

use base64::engine::general_purpose;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A document: attribute name to attribute value.
pub type Item = HashMap<String, AttrVal>;

/// A DynamoDB attribute value.
///
/// Sets (`SS`/`NS`/`BS`) are held in canonical form: sorted ascending and
/// duplicate-free. `validate_item` establishes that form on every input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrVal {
    S(String),
    N(String),
    B(Bytes),
    Bool(bool),
    Null(bool),
    SS(Vec<String>),
    NS(Vec<String>),
    BS(Vec<Bytes>),
    L(Vec<AttrVal>),
    M(HashMap<String, AttrVal>),
}

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum AttributeType {
    S,
    N,
    B,
    Bool,
    Null,
    SS,
    NS,
    BS,
    L,
    M,
}

impl Display for AttributeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::S => {
                write!(f, "string (S)")
            }
            AttributeType::N => {
                write!(f, "number (N)")
            }
            AttributeType::B => {
                write!(f, "binary (B)")
            }
            AttributeType::Bool => {
                write!(f, "boolean (BOOL)")
            }
            AttributeType::Null => {
                write!(f, "null (NULL)")
            }
            AttributeType::SS => {
                write!(f, "string set (SS)")
            }
            AttributeType::NS => {
                write!(f, "number set (NS)")
            }
            AttributeType::BS => {
                write!(f, "binary set (BS)")
            }
            AttributeType::L => {
                write!(f, "list (L)")
            }
            AttributeType::M => {
                write!(f, "map (M)")
            }
        }
    }
}

impl AttributeType {
    /// The tag as it appears in expressions, e.g. `attribute_type(p, :t)`
    /// where `:t` is `{"S": "SS"}`.
    pub fn tag(&self) -> &'static str {
        match self {
            AttributeType::S => "S",
            AttributeType::N => "N",
            AttributeType::B => "B",
            AttributeType::Bool => "BOOL",
            AttributeType::Null => "NULL",
            AttributeType::SS => "SS",
            AttributeType::NS => "NS",
            AttributeType::BS => "BS",
            AttributeType::L => "L",
            AttributeType::M => "M",
        }
    }

    pub fn from_tag(tag: &str) -> Option<AttributeType> {
        match tag {
            "S" => Some(AttributeType::S),
            "N" => Some(AttributeType::N),
            "B" => Some(AttributeType::B),
            "BOOL" => Some(AttributeType::Bool),
            "NULL" => Some(AttributeType::Null),
            "SS" => Some(AttributeType::SS),
            "NS" => Some(AttributeType::NS),
            "BS" => Some(AttributeType::BS),
            "L" => Some(AttributeType::L),
            "M" => Some(AttributeType::M),
            _ => None,
        }
    }
}

impl AttrVal {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttrVal::S(_) => AttributeType::S,
            AttrVal::N(_) => AttributeType::N,
            AttrVal::B(_) => AttributeType::B,
            AttrVal::Bool(_) => AttributeType::Bool,
            AttrVal::Null(_) => AttributeType::Null,
            AttrVal::SS(_) => AttributeType::SS,
            AttrVal::NS(_) => AttributeType::NS,
            AttrVal::BS(_) => AttributeType::BS,
            AttrVal::L(_) => AttributeType::L,
            AttrVal::M(_) => AttributeType::M,
        }
    }

    pub fn is_type(&self, t: AttributeType) -> bool {
        self.attribute_type() == t
    }

    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrVal::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttrVal::N(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_b(&self) -> Option<&Bytes> {
        match self {
            AttrVal::B(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_m(&self) -> Option<&HashMap<String, AttrVal>> {
        match self {
            AttrVal::M(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_l(&self) -> Option<&[AttrVal]> {
        match self {
            AttrVal::L(l) => Some(l),
            _ => None,
        }
    }
}

/* =================================================
Number handling
================================================= */

/// Parse the textual form of an N value. Rejects anything that is not a
/// finite IEEE-754 double.
pub(crate) fn parse_number(text: &str) -> Result<f64, StoreError> {
    let parsed = text
        .parse::<f64>()
        .map_err(|_| StoreError::Validation(format!("invalid numeric value: '{}'", text)))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(StoreError::Validation(format!(
            "numeric value out of range: '{}'",
            text
        )))
    }
}

/// Format a double back to its shortest round-trip decimal form.
pub(crate) fn format_number(value: f64) -> String {
    // Negative zero would print as "-0"; the two zeros are the same number.
    if value == 0.0 {
        "0".to_owned()
    } else {
        format!("{}", value)
    }
}

/* =================================================
Input validation
================================================= */

/// Validate a caller-supplied item and put its sets into canonical form.
pub(crate) fn validate_item(item: &mut Item) -> Result<(), StoreError> {
    for (name, value) in item.iter_mut() {
        if name.is_empty() {
            return Err(StoreError::Validation(
                "attribute name must not be empty".to_owned(),
            ));
        }
        validate_value(value)?;
    }
    Ok(())
}

/// Validate one attribute value tree, normalizing sets in place.
pub(crate) fn validate_value(value: &mut AttrVal) -> Result<(), StoreError> {
    match value {
        AttrVal::S(_) | AttrVal::B(_) | AttrVal::Bool(_) => Ok(()),
        AttrVal::Null(is_null) => {
            if *is_null {
                Ok(())
            } else {
                Err(StoreError::Validation(
                    "NULL attribute value must carry true".to_owned(),
                ))
            }
        }
        AttrVal::N(text) => parse_number(text).map(|_| ()),
        AttrVal::SS(members) => {
            reject_empty_set(members.len(), AttributeType::SS)?;
            members.sort();
            if members.windows(2).any(|w| w[0] == w[1]) {
                return Err(duplicate_member(AttributeType::SS));
            }
            Ok(())
        }
        AttrVal::NS(members) => {
            reject_empty_set(members.len(), AttributeType::NS)?;
            let mut parsed = Vec::with_capacity(members.len());
            for text in members.iter() {
                parsed.push((parse_number(text)?, text.clone()));
            }
            parsed.sort_by(|a, b| a.0.total_cmp(&b.0));
            if parsed.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(duplicate_member(AttributeType::NS));
            }
            *members = parsed.into_iter().map(|(_, text)| text).collect();
            Ok(())
        }
        AttrVal::BS(members) => {
            reject_empty_set(members.len(), AttributeType::BS)?;
            members.sort();
            if members.windows(2).any(|w| w[0] == w[1]) {
                return Err(duplicate_member(AttributeType::BS));
            }
            Ok(())
        }
        AttrVal::L(elements) => {
            for element in elements.iter_mut() {
                validate_value(element)?;
            }
            Ok(())
        }
        AttrVal::M(map) => {
            for (name, nested) in map.iter_mut() {
                if name.is_empty() {
                    return Err(StoreError::Validation(
                        "attribute name must not be empty".to_owned(),
                    ));
                }
                validate_value(nested)?;
            }
            Ok(())
        }
    }
}

fn reject_empty_set(len: usize, t: AttributeType) -> Result<(), StoreError> {
    if len == 0 {
        Err(StoreError::Validation(format!(
            "{} must not be empty",
            t
        )))
    } else {
        Ok(())
    }
}

fn duplicate_member(t: AttributeType) -> StoreError {
    StoreError::Validation(format!("{} contains duplicate members", t))
}

/* =================================================
Display
================================================= */

fn format_array_elements<T: Display>(f: &mut Formatter<'_>, vals: &[T]) -> fmt::Result {
    if let Some((last, rest)) = vals.split_last() {
        for val in rest {
            write!(f, "{},", val)?;
        }
        write!(f, "{}", last)?;
    }
    Ok(())
}

impl Display for AttrVal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AttrVal::N(val) => {
                f.write_str(val)?;
            }
            AttrVal::S(val) => {
                write!(f, "\"{}\"", escape_json_string(val))?;
            }
            AttrVal::Bool(val) => match val {
                false => f.write_str("false")?,
                true => f.write_str("true")?,
            },
            AttrVal::Null(_) => {
                f.write_str("null")?;
            }
            AttrVal::B(val) => {
                write!(f, "b64\"{}\"", general_purpose::STANDARD.encode(val))?;
            }
            AttrVal::L(vals) => {
                f.write_char('[')?;
                format_array_elements(f, vals)?;
                f.write_char(']')?;
            }
            AttrVal::M(map) => {
                f.write_char('{')?;
                let mut first = true;
                for (k, v) in map.iter() {
                    if first {
                        first = false;
                    } else {
                        f.write_char(',')?;
                    }
                    write!(f, "\"{}\":{}", escape_json_string(k), v)?;
                }
                f.write_char('}')?;
            }
            AttrVal::SS(vals) => {
                f.write_str("<<")?;
                if let Some((last, rest)) = vals.split_last() {
                    for val in rest {
                        write!(f, "\"{}\",", escape_json_string(val))?;
                    }
                    write!(f, "\"{}\"", escape_json_string(last))?;
                }
                f.write_str(">>")?;
            }
            AttrVal::NS(vals) => {
                f.write_str("<<")?;
                format_array_elements(f, vals)?;
                f.write_str(">>")?;
            }
            AttrVal::BS(vals) => {
                f.write_str("<<")?;
                if let Some((last, rest)) = vals.split_last() {
                    for val in rest {
                        write!(f, "b64\"{}\",", general_purpose::STANDARD.encode(val))?;
                    }
                    write!(f, "b64\"{}\"", general_purpose::STANDARD.encode(last))?;
                }
                f.write_str(">>")?;
            }
        }
        Ok(())
    }
}

/// Escape a string for embedding in the JSON-ish `Display` rendering.
fn escape_json_string(str: &str) -> String {
    let mut result = String::with_capacity(str.len());
    for ch in str.chars() {
        match ch {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\x08' => result.push_str("\\b"),
            '\x0C' => result.push_str("\\f"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => {
                if ch.is_control() {
                    let mut buf = [0u16; 2];
                    for unit in ch.encode_utf16(&mut buf) {
                        let _ = write!(result, "\\u{:04x}", unit);
                    }
                } else {
                    result.push(ch);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_val_display() {
        let item = AttrVal::M(HashMap::from([
            (
                "\"k\ne\0y\r\"".to_owned(),
                AttrVal::S("\tstr\x08\x0c\u{009F}bfnrt".to_owned()),
            ),
            ("n".to_owned(), AttrVal::N("123".to_owned())),
            ("null".to_owned(), AttrVal::Null(true)),
            ("true".to_owned(), AttrVal::Bool(true)),
            ("false".to_owned(), AttrVal::Bool(false)),
            (
                "b".to_owned(),
                AttrVal::B(Bytes::from_static(b"\xf0\x9f\x8d\xa3\n\0")),
            ),
            (
                "l".to_owned(),
                AttrVal::L(vec![
                    AttrVal::N("1".to_owned()),
                    AttrVal::S("2".to_owned()),
                    AttrVal::B(Bytes::from_static(b"\x03")),
                ]),
            ),
            ("m0".to_owned(), AttrVal::M(HashMap::new())),
            (
                "ss".to_owned(),
                AttrVal::SS(vec!["1".to_owned(), "2".to_owned()]),
            ),
            (
                "ns".to_owned(),
                AttrVal::NS(vec!["1".to_owned(), "2".to_owned()]),
            ),
            (
                "bs".to_owned(),
                AttrVal::BS(vec![
                    Bytes::from_static(b"\x01"),
                    Bytes::from_static(b"\x02"),
                ]),
            ),
        ]));
        let result = format!("{}", item);
        let chars: Vec<_> = result.chars().collect();
        assert_eq!(*chars.first().unwrap(), '{');
        assert_eq!(*chars.last().unwrap(), '}');
        assert!(result.contains(r#""\"k\ne\u0000y\r\"":"\tstr\b\f\u009fbfnrt""#));
        assert!(result.contains(r#""n":123"#));
        assert!(result.contains(r#""null":null"#));
        assert!(result.contains(r#""true":true"#));
        assert!(result.contains(r#""false":false"#));
        assert!(result.contains(r#""b":b64"8J+NowoA""#));
        assert!(result.contains(r#""l":[1,"2",b64"Aw=="]"#));
        assert!(result.contains(r#""m0":{}"#));
        assert!(result.contains(r#""ss":<<"1","2">>"#));
        assert!(result.contains(r#""ns":<<1,2>>"#));
        assert!(result.contains(r#""bs":<<b64"AQ==",b64"Ag==">>"#));
    }

    #[test]
    fn test_parse_number_accepts_finite() {
        assert_eq!(parse_number("10").unwrap(), 10.0);
        assert_eq!(parse_number("-0.5").unwrap(), -0.5);
        assert_eq!(parse_number("1e3").unwrap(), 1000.0);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert!(parse_number("").is_err());
        assert!(parse_number("ten").is_err());
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("inf").is_err());
    }

    #[test]
    fn test_format_number_shortest() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(1e21), "1e21");
    }

    #[test]
    fn test_validate_normalizes_sets() {
        let mut val = AttrVal::NS(vec!["10".to_owned(), "-1".to_owned(), "2".to_owned()]);
        validate_value(&mut val).unwrap();
        assert_eq!(
            val,
            AttrVal::NS(vec!["-1".to_owned(), "2".to_owned(), "10".to_owned()])
        );

        let mut val = AttrVal::SS(vec!["b".to_owned(), "a".to_owned()]);
        validate_value(&mut val).unwrap();
        assert_eq!(val, AttrVal::SS(vec!["a".to_owned(), "b".to_owned()]));
    }

    #[test]
    fn test_validate_rejects_duplicate_set_members() {
        let mut val = AttrVal::NS(vec!["1".to_owned(), "1.0".to_owned()]);
        assert!(validate_value(&mut val).is_err());

        let mut val = AttrVal::SS(vec!["a".to_owned(), "a".to_owned()]);
        assert!(validate_value(&mut val).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_set_and_bad_number() {
        let mut val = AttrVal::SS(vec![]);
        assert!(validate_value(&mut val).is_err());

        let mut val = AttrVal::N("12abc".to_owned());
        assert!(validate_value(&mut val).is_err());

        let mut item: Item = HashMap::from([("".to_owned(), AttrVal::Bool(true))]);
        assert!(validate_item(&mut item).is_err());
    }

    #[test]
    fn test_null_must_be_true() {
        let mut val = AttrVal::Null(false);
        assert!(validate_value(&mut val).is_err());
    }
}
