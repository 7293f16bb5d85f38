use std::fmt;

use serde::{Deserialize, Serialize};

/// Field types recognized by the classifier.
///
/// Overflowing integers are reported as `String` with the overflow marker set
/// on the parsed value, so narrow conversions can refuse them explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Null,
    String,
    Integer,
    Float,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of classifying a field's bytes: the type tag together with the
/// numeric value when one was produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed {
    Null,
    Str { overflow: bool },
    Int(i64),
    Float(f64),
}

impl Parsed {
    pub fn data_type(&self) -> DataType {
        match self {
            Parsed::Null => DataType::Null,
            Parsed::Str { .. } => DataType::String,
            Parsed::Int(_) => DataType::Integer,
            Parsed::Float(_) => DataType::Float,
        }
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Parsed::Str { overflow: true })
    }
}

/// Classifies a field and produces its numeric value in a single
/// left-to-right scan.
///
/// Rules:
/// - leading/trailing ASCII spaces are padding; all-space input is null;
/// - at most one leading `-` and at most one `.`;
/// - a space run after digits is treated as trailing padding, but any digit
///   after it downgrades the field to a string (`"510 123 4567"`);
/// - any other byte makes the field a string;
/// - digits with a `.` make a float, digits alone an integer;
/// - integer text that does not fit an `i64` (or float text that is not
///   finite) is a string with the overflow marker set.
pub fn classify(input: &[u8]) -> Parsed {
    if input.is_empty() {
        return Parsed::Null;
    }

    let mut ws_allowed = true;
    let mut neg_allowed = true;
    let mut dot_allowed = true;
    let mut digit_allowed = true;
    let mut has_digit = false;
    let mut is_float = false;

    let mut negative = false;
    let mut int_acc: Option<i64> = Some(0);
    let mut float_acc = 0.0f64;
    let mut frac_scale: Option<f64> = None;

    for (i, &byte) in input.iter().enumerate() {
        match byte {
            b' ' => {
                if !ws_allowed {
                    if input[i - 1].is_ascii_digit() {
                        // Possible trailing padding after the number.
                        digit_allowed = false;
                        ws_allowed = true;
                    } else {
                        return Parsed::Str { overflow: false };
                    }
                }
            }
            b'-' => {
                if !neg_allowed || has_digit || is_float {
                    return Parsed::Str { overflow: false };
                }
                neg_allowed = false;
                negative = true;
            }
            b'.' => {
                if !dot_allowed {
                    return Parsed::Str { overflow: false };
                }
                dot_allowed = false;
                is_float = true;
                frac_scale = Some(0.1);
            }
            b'0'..=b'9' => {
                if !digit_allowed {
                    // A digit after an internal space run: phone-number shape.
                    return Parsed::Str { overflow: false };
                }
                ws_allowed = false;
                has_digit = true;
                let digit = i64::from(byte - b'0');
                match frac_scale {
                    Some(scale) => {
                        float_acc += digit as f64 * scale;
                        frac_scale = Some(scale / 10.0);
                    }
                    None => {
                        // Accumulate with the sign applied so i64::MIN parses.
                        int_acc = int_acc.and_then(|acc| acc.checked_mul(10)).and_then(|acc| {
                            if negative {
                                acc.checked_sub(digit)
                            } else {
                                acc.checked_add(digit)
                            }
                        });
                        float_acc = float_acc * 10.0 + digit as f64;
                    }
                }
            }
            _ => return Parsed::Str { overflow: false },
        }
    }

    if !has_digit {
        // Only padding, or a bare sign/dot.
        return Parsed::Null;
    }

    if is_float {
        let value = if negative { -float_acc } else { float_acc };
        if value.is_finite() {
            Parsed::Float(value)
        } else {
            Parsed::Str { overflow: true }
        }
    } else {
        match int_acc {
            Some(acc) => Parsed::Int(acc),
            None => Parsed::Str { overflow: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_integers() {
        assert_eq!(classify(b"1"), Parsed::Int(1));
        assert_eq!(classify(b" 2018   "), Parsed::Int(2018));
        assert_eq!(classify(b" -69 "), Parsed::Int(-69));
    }

    #[test]
    fn recognizes_floats() {
        assert_eq!(classify(b"3.14"), Parsed::Float(3.14));
        assert_eq!(classify(b"       -3.14            "), Parsed::Float(-3.14));
        assert_eq!(classify(b".5"), Parsed::Float(0.5));
        assert_eq!(classify(b"5."), Parsed::Float(5.0));
    }

    #[test]
    fn recognizes_strings() {
        for input in [
            "test",
            "999.999.9999",
            "510-123-4567",
            "510 123",
            "510 123 4567",
            "1-2",
            "5-",
        ] {
            assert_eq!(
                classify(input.as_bytes()),
                Parsed::Str { overflow: false },
                "input {input:?}"
            );
        }
    }

    #[test]
    fn recognizes_null() {
        assert_eq!(classify(b""), Parsed::Null);
        assert_eq!(classify(b"   "), Parsed::Null);
        // A bare sign or dot carries no digits.
        assert_eq!(classify(b"-"), Parsed::Null);
    }

    #[test]
    fn trailing_padding_after_digits_is_accepted() {
        assert_eq!(classify(b"42 "), Parsed::Int(42));
        assert_eq!(classify(b"42  "), Parsed::Int(42));
    }

    #[test]
    fn mixed_field_sample_classifies_per_type() {
        assert_eq!(classify(b"").data_type(), DataType::Null);
        assert_eq!(classify(b"42").data_type(), DataType::Integer);
        assert_eq!(classify(b"-3.14").data_type(), DataType::Float);
        assert_eq!(classify(b"510 123 4567").data_type(), DataType::String);
        assert_eq!(classify(b"  ").data_type(), DataType::Null);
    }

    #[test]
    fn integer_overflow_is_tagged() {
        let just_fits = i64::MAX.to_string();
        assert_eq!(classify(just_fits.as_bytes()), Parsed::Int(i64::MAX));

        let min = i64::MIN.to_string();
        assert_eq!(classify(min.as_bytes()), Parsed::Int(i64::MIN));

        let too_big = "9223372036854775808"; // i64::MAX + 1
        let parsed = classify(too_big.as_bytes());
        assert_eq!(parsed, Parsed::Str { overflow: true });
        assert!(parsed.is_overflow());
        assert_eq!(parsed.data_type(), DataType::String);
    }

    #[test]
    fn data_type_renders_lowercase_names() {
        assert_eq!(DataType::Integer.to_string(), "integer");
        assert_eq!(DataType::Null.to_string(), "null");
    }
}
