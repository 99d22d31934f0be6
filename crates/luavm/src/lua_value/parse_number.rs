// String -> number conversion shared by arithmetic coercion and `tonumber`

/// Parse a numeral: optional sign, decimal (with fraction/exponent) or
/// hexadecimal (with optional fraction and binary exponent). Surrounding
/// whitespace is allowed; anything else makes the conversion fail.
pub fn parse_lua_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, rest) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let value = if rest.starts_with("0x") || rest.starts_with("0X") {
        parse_hex(&rest[2..])?
    } else {
        parse_decimal(rest)?
    };

    Some(if negative { -value } else { value })
}

fn parse_decimal(s: &str) -> Option<f64> {
    // Rust accepts "inf"/"nan"/"infinity"; numerals never do
    let valid = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        && s.bytes().next().is_some_and(|b| b.is_ascii_digit() || b == b'.');
    if !valid {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Hex numeral after the `0x` prefix, e.g. "ff", "1.8p+1"
fn parse_hex(s: &str) -> Option<f64> {
    let (mantissa_str, exp_str) = match s.find(['p', 'P']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };

    let mut mantissa = 0.0f64;
    let mut found_dot = false;
    let mut any_digit = false;
    let mut exponent: i32 = 0;

    for ch in mantissa_str.chars() {
        if ch == '.' {
            if found_dot {
                return None;
            }
            found_dot = true;
        } else if let Some(digit) = ch.to_digit(16) {
            mantissa = mantissa * 16.0 + digit as f64;
            any_digit = true;
            if found_dot {
                exponent -= 4;
            }
        } else {
            return None;
        }
    }
    if !any_digit {
        return None;
    }

    if let Some(exp_str) = exp_str {
        let exp: i32 = exp_str.parse().ok()?;
        exponent = exponent.checked_add(exp)?;
    }

    Some(mantissa * 2.0f64.powi(exponent))
}

/// `tonumber(s, base)`: an integer numeral in `base` (2..=36), optional leading '-'
pub fn parse_lua_number_radix(s: &str, base: u32) -> Option<f64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i64 = 0;
    for ch in digits.chars() {
        let digit = ch.to_digit(base)? as i64;
        value = value.wrapping_mul(base as i64).wrapping_add(digit);
    }

    let value = if negative { value.wrapping_neg() } else { value };
    Some(value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal() {
        assert_eq!(parse_lua_number("42"), Some(42.0));
        assert_eq!(parse_lua_number("  -3.5  "), Some(-3.5));
        assert_eq!(parse_lua_number("1e3"), Some(1000.0));
        assert_eq!(parse_lua_number(".5"), Some(0.5));
        assert_eq!(parse_lua_number("inf"), None);
        assert_eq!(parse_lua_number("nan"), None);
        assert_eq!(parse_lua_number("12abc"), None);
        assert_eq!(parse_lua_number(""), None);
    }

    #[test]
    fn test_hex() {
        assert_eq!(parse_lua_number("0xff"), Some(255.0));
        assert_eq!(parse_lua_number("0x1.8p1"), Some(3.0));
        assert_eq!(parse_lua_number("-0X10"), Some(-16.0));
        assert_eq!(parse_lua_number("0x"), None);
    }

    #[test]
    fn test_radix() {
        assert_eq!(parse_lua_number_radix("ff", 16), Some(255.0));
        assert_eq!(parse_lua_number_radix("-101", 2), Some(-5.0));
        assert_eq!(parse_lua_number_radix("z", 36), Some(35.0));
        assert_eq!(parse_lua_number_radix("8", 8), None);
    }
}
