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

// Order-preserving key codec. A typed composite key becomes a byte string
// whose lexicographic order equals the natural order of the typed values,
// laid out as:
//
//   esc(table) [0x01 0x49 esc(index)] 0x00 <value> 0x00 [<value>]
//
// where <value> is a one-byte type tag ('S' | 'N' | 'B') followed by the
// payload. String and binary payloads are escaped (0x00 -> 0x01 0x01,
// 0x01 -> 0x01 0x02) so the separator never appears inside a payload;
// numbers are a fixed 9-byte monotone transform of the IEEE-754 double.

use std::error::Error;
use std::fmt;

use crate::error::StoreError;
use crate::key::KeyValues;
use crate::types::{format_number, parse_number, AttrVal};

pub(crate) const SEP: u8 = 0x00;
const ESC: u8 = 0x01;
const ESC_ZERO: u8 = 0x01;
const ESC_ONE: u8 = 0x02;
/// Second byte of the GSI marker; `0x01 0x49` cannot appear in escaped
/// content because 0x49 is not an escape continuation.
const GSI_MARK: u8 = 0x49;

const TAG_S: u8 = b'S';
const TAG_N: u8 = b'N';
const TAG_B: u8 = b'B';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCodecError {
    /// An escape byte was followed by end-of-input or an unknown byte.
    InvalidEscape { byte: u8, pos: usize },
    /// The encoded key ended before the structure was complete.
    UnexpectedEnd,
    /// An encoded value started with an unknown type tag.
    InvalidTypeTag(u8),
    /// A required separator was missing.
    MissingSeparator,
}

impl fmt::Display for KeyCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCodecError::InvalidEscape { byte, pos } => {
                write!(f, "invalid escape byte {:#04x} at offset {}", byte, pos)
            }
            KeyCodecError::UnexpectedEnd => {
                write!(f, "unexpected end of encoded key")
            }
            KeyCodecError::InvalidTypeTag(tag) => {
                write!(f, "unknown key type tag {:#04x}", tag)
            }
            KeyCodecError::MissingSeparator => {
                write!(f, "encoded key is missing a separator")
            }
        }
    }
}

impl Error for KeyCodecError {}

impl From<KeyCodecError> for StoreError {
    fn from(err: KeyCodecError) -> Self {
        StoreError::Validation(format!("malformed encoded key: {}", err))
    }
}

/* =================================================
Escaping
================================================= */

/// Append `src` to `dst` with 0x00 and 0x01 escaped. The escape is
/// order-preserving and injective, and its image never contains a bare 0x00.
fn escape_into(dst: &mut Vec<u8>, src: &[u8]) {
    for &byte in src {
        match byte {
            SEP => {
                dst.push(ESC);
                dst.push(ESC_ZERO);
            }
            ESC => {
                dst.push(ESC);
                dst.push(ESC_ONE);
            }
            _ => dst.push(byte),
        }
    }
}

/// Reverse `escape_into`. Fails on a dangling or unknown escape.
fn unescape(src: &[u8]) -> Result<Vec<u8>, KeyCodecError> {
    let mut result = Vec::with_capacity(src.len());
    let mut iter = src.iter().enumerate();
    while let Some((pos, &byte)) = iter.next() {
        if byte != ESC {
            result.push(byte);
            continue;
        }
        match iter.next() {
            Some((_, &ESC_ZERO)) => result.push(SEP),
            Some((_, &ESC_ONE)) => result.push(ESC),
            Some((pos, &other)) => {
                return Err(KeyCodecError::InvalidEscape { byte: other, pos });
            }
            None => {
                return Err(KeyCodecError::InvalidEscape { byte, pos });
            }
        }
    }
    Ok(result)
}

/* =================================================
Number transform
================================================= */

/// Encode a textual number as a sign byte plus 8 transformed big-endian
/// bytes. Lexicographic order of the output equals numeric order of the
/// input across the whole double range.
pub fn encode_number(text: &str) -> Result<[u8; 9], StoreError> {
    let mut value = parse_number(text)?;
    if value == 0.0 {
        // -0.0 and 0.0 must encode identically.
        value = 0.0;
    }
    let mut out = [0u8; 9];
    let bits = value.to_bits();
    if value.is_sign_negative() {
        // Invert everything so that more-negative sorts first.
        out[0] = 0x00;
        out[1..].copy_from_slice(&(!bits).to_be_bytes());
    } else {
        // Flip the sign bit so that non-negatives sort above negatives.
        out[0] = 0x01;
        out[1..].copy_from_slice(&(bits ^ (1u64 << 63)).to_be_bytes());
    }
    Ok(out)
}

/// Reverse `encode_number`, formatting back to the shortest round-trip
/// decimal form.
pub fn decode_number(bytes: &[u8]) -> Result<String, KeyCodecError> {
    if bytes.len() != 9 {
        return Err(KeyCodecError::UnexpectedEnd);
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[1..]);
    let transformed = u64::from_be_bytes(raw);
    let bits = match bytes[0] {
        0x00 => !transformed,
        0x01 => transformed ^ (1u64 << 63),
        tag => return Err(KeyCodecError::InvalidTypeTag(tag)),
    };
    Ok(format_number(f64::from_bits(bits)))
}

/* =================================================
Key assembly
================================================= */

fn encode_value_into(dst: &mut Vec<u8>, value: &AttrVal) -> Result<(), StoreError> {
    match value {
        AttrVal::S(text) => {
            if text.is_empty() {
                return Err(StoreError::Validation(
                    "key attribute value must not be empty".to_owned(),
                ));
            }
            dst.push(TAG_S);
            escape_into(dst, text.as_bytes());
        }
        AttrVal::B(bytes) => {
            if bytes.is_empty() {
                return Err(StoreError::Validation(
                    "key attribute value must not be empty".to_owned(),
                ));
            }
            dst.push(TAG_B);
            escape_into(dst, bytes);
        }
        AttrVal::N(text) => {
            dst.push(TAG_N);
            dst.extend_from_slice(&encode_number(text)?);
        }
        other => {
            return Err(StoreError::Validation(format!(
                "key attribute must be S, N, or B, got {}",
                other.attribute_type()
            )));
        }
    }
    Ok(())
}

/// The byte prefix shared by every row of a table (or of one of its GSIs).
pub fn table_prefix(table: &str, index: Option<&str>) -> Vec<u8> {
    let mut out = Vec::with_capacity(table.len() + 2);
    escape_into(&mut out, table.as_bytes());
    if let Some(index_name) = index {
        out.push(ESC);
        out.push(GSI_MARK);
        escape_into(&mut out, index_name.as_bytes());
    }
    out.push(SEP);
    out
}

/// The byte prefix shared by every row of one partition, through the second
/// separator. A prefix iteration over this visits exactly that partition.
pub fn partition_prefix(
    table: &str,
    index: Option<&str>,
    partition: &AttrVal,
) -> Result<Vec<u8>, StoreError> {
    let mut out = table_prefix(table, index);
    encode_value_into(&mut out, partition)?;
    out.push(SEP);
    Ok(out)
}

/// The full row key for a composite key value.
pub fn row_key(
    table: &str,
    index: Option<&str>,
    values: &KeyValues,
) -> Result<Vec<u8>, StoreError> {
    let mut out = partition_prefix(table, index, &values.partition)?;
    if let Some(sort) = &values.sort {
        encode_value_into(&mut out, sort)?;
    }
    Ok(out)
}

/// Append one encoded key value (tag + payload) without any separator.
/// Used to build range bounds from sort-key conditions.
pub(crate) fn encoded_value(value: &AttrVal) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    encode_value_into(&mut out, value)?;
    Ok(out)
}

/// The partial encoding that every sort key beginning with `prefix` starts
/// with. Valid for S and B sort keys; the escape transform is prefix
/// preserving, so byte-prefix containment equals value-prefix containment.
pub(crate) fn encoded_prefix(value: &AttrVal) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    match value {
        AttrVal::S(text) => {
            out.push(TAG_S);
            escape_into(&mut out, text.as_bytes());
        }
        AttrVal::B(bytes) => {
            out.push(TAG_B);
            escape_into(&mut out, bytes);
        }
        other => {
            return Err(StoreError::Validation(format!(
                "begins_with requires an S or B operand, got {}",
                other.attribute_type()
            )));
        }
    }
    Ok(out)
}

/// The smallest byte string strictly greater than every string that starts
/// with `prefix`, or None when no such bound exists (all 0xff).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xff {
            out.pop();
        } else {
            *out.last_mut().unwrap() += 1;
            return Some(out);
        }
    }
    None
}

/* =================================================
Decoding
================================================= */

/// A fully decoded row key.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedKey {
    pub table: String,
    pub index: Option<String>,
    pub partition: AttrVal,
    pub sort: Option<AttrVal>,
}

/// Decode a row key produced by `row_key`.
pub fn decode_row_key(bytes: &[u8]) -> Result<DecodedKey, KeyCodecError> {
    // The name section runs to the first bare separator; inside it, an
    // unescaped 0x01 0x49 pair splits table name from index name.
    let sep = bytes
        .iter()
        .position(|&b| b == SEP)
        .ok_or(KeyCodecError::MissingSeparator)?;
    let name_section = &bytes[..sep];

    let mut marker = None;
    let mut i = 0;
    while i < name_section.len() {
        if name_section[i] == ESC {
            match name_section.get(i + 1) {
                Some(&ESC_ZERO) | Some(&ESC_ONE) => i += 2,
                Some(&GSI_MARK) => {
                    marker = Some(i);
                    break;
                }
                Some(&other) => {
                    return Err(KeyCodecError::InvalidEscape {
                        byte: other,
                        pos: i + 1,
                    });
                }
                None => {
                    return Err(KeyCodecError::InvalidEscape {
                        byte: ESC,
                        pos: i,
                    });
                }
            }
        } else {
            i += 1;
        }
    }

    let (table, index) = match marker {
        Some(at) => {
            let table = String::from_utf8(unescape(&name_section[..at])?)
                .map_err(|_| KeyCodecError::UnexpectedEnd)?;
            let index = String::from_utf8(unescape(&name_section[at + 2..])?)
                .map_err(|_| KeyCodecError::UnexpectedEnd)?;
            (table, Some(index))
        }
        None => {
            let table = String::from_utf8(unescape(name_section)?)
                .map_err(|_| KeyCodecError::UnexpectedEnd)?;
            (table, None)
        }
    };

    let rest = &bytes[sep + 1..];
    let (partition, consumed) = decode_value(rest)?;
    let rest = &rest[consumed..];
    let rest = match rest.first() {
        Some(&SEP) => &rest[1..],
        Some(_) => return Err(KeyCodecError::MissingSeparator),
        None => return Err(KeyCodecError::MissingSeparator),
    };
    let sort = if rest.is_empty() {
        None
    } else {
        let (value, consumed) = decode_value(rest)?;
        if consumed != rest.len() {
            return Err(KeyCodecError::MissingSeparator);
        }
        Some(value)
    };

    Ok(DecodedKey {
        table,
        index,
        partition,
        sort,
    })
}

/// Decode one tagged value; returns the value and the bytes consumed.
fn decode_value(bytes: &[u8]) -> Result<(AttrVal, usize), KeyCodecError> {
    let tag = *bytes.first().ok_or(KeyCodecError::UnexpectedEnd)?;
    match tag {
        TAG_N => {
            if bytes.len() < 10 {
                return Err(KeyCodecError::UnexpectedEnd);
            }
            let text = decode_number(&bytes[1..10])?;
            Ok((AttrVal::N(text), 10))
        }
        TAG_S | TAG_B => {
            let payload_end = bytes[1..]
                .iter()
                .position(|&b| b == SEP)
                .map(|p| p + 1)
                .unwrap_or(bytes.len());
            let payload = unescape(&bytes[1..payload_end])?;
            let value = if tag == TAG_S {
                AttrVal::S(
                    String::from_utf8(payload).map_err(|_| KeyCodecError::UnexpectedEnd)?,
                )
            } else {
                AttrVal::B(payload.into())
            };
            Ok((value, payload_end))
        }
        other => Err(KeyCodecError::InvalidTypeTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rand::{Rng, RngCore};

    fn s(text: &str) -> AttrVal {
        AttrVal::S(text.to_owned())
    }

    fn n(text: &str) -> AttrVal {
        AttrVal::N(text.to_owned())
    }

    fn key(partition: AttrVal, sort: Option<AttrVal>) -> Vec<u8> {
        row_key("t", None, &KeyValues { partition, sort }).unwrap()
    }

    #[test]
    fn test_escape_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let len = rng.gen_range(0..64);
            let mut raw = vec![0u8; len];
            rng.fill_bytes(&mut raw);
            let mut escaped = Vec::new();
            escape_into(&mut escaped, &raw);
            assert!(!escaped.contains(&SEP));
            assert_eq!(unescape(&escaped).unwrap(), raw);
        }
    }

    #[test]
    fn test_unescape_rejects_dangling_escape() {
        assert!(unescape(&[0x01]).is_err());
        assert!(unescape(&[0x41, 0x01, 0x7f]).is_err());
    }

    #[test]
    fn test_number_order_fidelity() {
        let ordered = [
            "-1.5e300", "-100", "-10", "-1", "-0.5", "-1e-300", "0", "1e-300", "0.5", "1", "10",
            "100", "1000", "1.5e300",
        ];
        let encoded: Vec<_> = ordered.iter().map(|t| encode_number(t).unwrap()).collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_number_encoding_is_stable_across_spellings() {
        assert_eq!(encode_number("10").unwrap(), encode_number("10.0").unwrap());
        assert_eq!(encode_number("10").unwrap(), encode_number("1e1").unwrap());
        assert_eq!(encode_number("0").unwrap(), encode_number("-0").unwrap());
    }

    #[test]
    fn test_number_round_trip() {
        for text in ["-100", "-0.25", "0", "0.1", "42", "1e21", "123456789.5"] {
            let decoded = decode_number(&encode_number(text).unwrap()).unwrap();
            assert_eq!(
                decoded.parse::<f64>().unwrap(),
                text.parse::<f64>().unwrap(),
                "round trip of {}",
                text
            );
        }
    }

    #[test]
    fn test_string_order_fidelity() {
        let ordered = ["", "a", "aa", "ab", "b", "ba"];
        let encoded: Vec<_> = ordered
            .iter()
            .map(|t| {
                let mut out = Vec::new();
                escape_into(&mut out, t.as_bytes());
                out
            })
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_binary_order_survives_escaping() {
        let ordered: [&[u8]; 5] = [b"\x00", b"\x00\x00", b"\x01", b"\x01\x02", b"\x02"];
        let encoded: Vec<_> = ordered
            .iter()
            .map(|t| {
                let mut out = Vec::new();
                escape_into(&mut out, t);
                out
            })
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_sort_key_order_within_partition() {
        let k1 = key(s("p"), Some(n("-10")));
        let k2 = key(s("p"), Some(n("-1")));
        let k3 = key(s("p"), Some(n("0")));
        let k4 = key(s("p"), Some(n("5")));
        assert!(k1 < k2 && k2 < k3 && k3 < k4);
    }

    #[test]
    fn test_partition_prefix_is_exact() {
        let prefix = partition_prefix("t", None, &s("a")).unwrap();
        let inside = key(s("a"), Some(s("x")));
        let outside = key(s("ab"), Some(s("x")));
        assert!(inside.starts_with(&prefix));
        assert!(!outside.starts_with(&prefix));
    }

    #[test]
    fn test_gsi_rows_do_not_collide_with_base_rows() {
        let base = table_prefix("t", None);
        let gsi = table_prefix("t", Some("g"));
        assert!(!gsi.starts_with(&base));
        assert!(!base.starts_with(&gsi));
    }

    #[test]
    fn test_table_names_with_separator_bytes_stay_isolated() {
        // A table name containing 0x00 or 0x01 must not fold into another.
        let a = table_prefix("t\u{0}x", None);
        let b = table_prefix("t", None);
        assert!(!a.starts_with(&b));
    }

    #[test]
    fn test_row_key_round_trip() {
        let cases = [
            ("t", None, s("part"), Some(n("42"))),
            ("t", Some("g"), s("part"), Some(s("sort"))),
            ("t", None, n("-1.5"), None),
            (
                "t",
                None,
                AttrVal::B(Bytes::from_static(b"\x00\x01\xff")),
                Some(AttrVal::B(Bytes::from_static(b"\x01\x00"))),
            ),
        ];
        for (table, index, partition, sort) in cases {
            let encoded = row_key(
                table,
                index,
                &KeyValues {
                    partition: partition.clone(),
                    sort: sort.clone(),
                },
            )
            .unwrap();
            let decoded = decode_row_key(&encoded).unwrap();
            assert_eq!(decoded.table, table);
            assert_eq!(decoded.index.as_deref(), index);
            assert_eq!(decoded.sort, sort);
            match (&decoded.partition, &partition) {
                (AttrVal::N(a), AttrVal::N(b)) => {
                    assert_eq!(
                        a.parse::<f64>().unwrap(),
                        b.parse::<f64>().unwrap()
                    );
                }
                (a, b) => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn test_rejects_non_scalar_key_values() {
        assert!(encoded_value(&AttrVal::Bool(true)).is_err());
        assert!(encoded_value(&s("")).is_err());
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"ab").unwrap(), b"ac".to_vec());
        assert_eq!(prefix_successor(b"a\xff").unwrap(), b"b".to_vec());
        assert_eq!(prefix_successor(b"\xff\xff"), None);
    }
}
