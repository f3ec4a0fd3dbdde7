//! Scalar typing for form values, which always arrive as strings.

use serde_json::{Number, Value};

/// Infers a number, boolean or string from a form value.
///
/// - `""` stays an empty string
/// - anything parsable as a finite decimal number becomes a number, integers stay integers;
///   surrounding whitespace is ignored but a blank value stays a string, and hex, octal or binary
///   literals such as `0x10` stay strings
/// - `"true"` / `"false"` become booleans
/// - everything else is kept as is
pub fn coerce(value: &str) -> Value {
    if value.is_empty() {
        return Value::String(String::new());
    }

    if let Some(number) = parse_number(value) {
        return Value::Number(number);
    }

    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(value.to_owned()),
    }
}

fn parse_number(value: &str) -> Option<Number> {
    let trimmed = value.trim();
    // rust accepts "inf" and "nan" spellings, form values never mean those
    if trimmed.is_empty() || trimmed.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return None;
    }

    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Number::from(int));
    }

    if let Ok(uint) = trimmed.parse::<u64>() {
        return Some(Number::from(uint));
    }

    trimmed.parse::<f64>().ok().and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_is_empty_string() {
        assert_eq!(coerce(""), json!(""));
    }

    #[test]
    fn numbers() {
        assert_eq!(coerce("5"), json!(5));
        assert_eq!(coerce("-12"), json!(-12));
        assert_eq!(coerce("3.25"), json!(3.25));
        assert_eq!(coerce("1e3"), json!(1000.0));
        assert_eq!(coerce(" 7 "), json!(7));
        assert_eq!(coerce("18446744073709551615"), json!(18_446_744_073_709_551_615_u64));
    }

    #[test]
    fn booleans() {
        assert_eq!(coerce("true"), json!(true));
        assert_eq!(coerce("false"), json!(false));
        assert_eq!(coerce("True"), json!("True"));
    }

    #[test]
    fn strings() {
        assert_eq!(coerce("hello"), json!("hello"));
        assert_eq!(coerce("inf"), json!("inf"));
        assert_eq!(coerce("NaN"), json!("NaN"));
        assert_eq!(coerce("12abc"), json!("12abc"));
        assert_eq!(coerce("   "), json!("   "));
    }

    #[test]
    fn only_decimal_numbers() {
        assert_eq!(coerce("0x10"), json!("0x10"));
        assert_eq!(coerce("0o17"), json!("0o17"));
        assert_eq!(coerce("0b11"), json!("0b11"));
        assert_eq!(coerce("Infinity"), json!("Infinity"));
        assert_eq!(coerce("\t\n"), json!("\t\n"));
        assert_eq!(coerce("010"), json!(10));
    }
}
