//! Numeric literal scanning.
//!
//! `scan_number` is the single numeric entry point shared by the reader and
//! the `scan-number` native. Unparsable input yields `None` rather than an
//! error: callers decide whether absence matters.

/// Parse a number token: optional sign, decimal with optional fraction and
/// exponent, or a `0x` hex integer. Underscores between digits are ignored.
pub fn scan_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let (negative, rest) = match bytes.first() {
        Some(b'+') => (false, &bytes[1..]),
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    if rest.is_empty() {
        return None;
    }
    let magnitude = if rest.len() > 2 && (rest.starts_with(b"0x") || rest.starts_with(b"0X")) {
        scan_hex(&rest[2..])?
    } else {
        scan_decimal(rest)?
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn scan_hex(digits: &[u8]) -> Option<f64> {
    let mut value = 0f64;
    let mut seen = false;
    for &b in digits {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            b'_' => continue,
            _ => return None,
        };
        seen = true;
        value = value * 16.0 + d as f64;
    }
    seen.then_some(value)
}

fn scan_decimal(token: &[u8]) -> Option<f64> {
    let mut cleaned = String::with_capacity(token.len());
    let mut mantissa_digits = 0usize;
    let mut dots = 0usize;
    let mut i = 0usize;

    while i < token.len() {
        match token[i] {
            b'0'..=b'9' => {
                mantissa_digits += 1;
                cleaned.push(token[i] as char);
            }
            b'.' => {
                dots += 1;
                if dots > 1 {
                    return None;
                }
                cleaned.push('.');
            }
            b'_' => {}
            b'e' | b'E' => break,
            _ => return None,
        }
        i += 1;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if i < token.len() {
        // Exponent part: e, optional sign, at least one digit.
        cleaned.push('e');
        i += 1;
        if let Some(&sign @ (b'+' | b'-')) = token.get(i) {
            cleaned.push(sign as char);
            i += 1;
        }
        let mut exp_digits = 0usize;
        while i < token.len() {
            match token[i] {
                b'0'..=b'9' => {
                    exp_digits += 1;
                    cleaned.push(token[i] as char);
                }
                b'_' => {}
                _ => return None,
            }
            i += 1;
        }
        if exp_digits == 0 {
            return None;
        }
    }

    cleaned.parse::<f64>().ok()
}
