//! # Resource Quantities
//!
//! Canonical rendering of CPU and memory quantities.
//!
//! The API server stores quantities in canonical form ("1000m" comes back as
//! "1", "1024Mi" as "1Gi"). Desired values are normalised the same way before
//! they are compared with what the store reports, otherwise an equivalent but
//! differently spelled value would produce an update on every attempt.

const DECIMAL_SUFFIXES: [(&str, u32); 6] = [
    ("E", 18),
    ("P", 15),
    ("T", 12),
    ("G", 9),
    ("M", 6),
    ("k", 3),
];

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ei", 60),
    ("Pi", 50),
    ("Ti", 40),
    ("Gi", 30),
    ("Mi", 20),
    ("Ki", 10),
];

/// Canonical form of a CPU quantity ("0.5" -> "500m", "2000m" -> "2").
///
/// Accepts whole numbers, up to three decimals, or a milli suffix.
pub fn canonical_cpu(input: &str) -> Option<String> {
    let input = input.trim();
    let millis: u128 = if let Some(value) = input.strip_suffix('m') {
        parse_digits(value)?
    } else if let Some((whole, frac)) = input.split_once('.') {
        if frac.is_empty() || frac.len() > 3 {
            return None;
        }
        let whole = if whole.is_empty() { 0 } else { parse_digits(whole)? };
        let scale = 10u128.pow(3 - frac.len() as u32);
        whole.checked_mul(1000)?.checked_add(parse_digits(frac)? * scale)?
    } else {
        parse_digits(input)?.checked_mul(1000)?
    };
    Some(render_decimal_millis(millis))
}

/// Canonical form of a memory quantity ("1024Mi" -> "1Gi", "1000M" -> "1G").
///
/// Accepts whole numbers with an optional decimal or binary suffix. Binary
/// input stays binary, everything else renders with decimal suffixes.
pub fn canonical_memory(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some((suffix, shift)) = BINARY_SUFFIXES
        .iter()
        .find(|(suffix, _)| input.ends_with(suffix))
    {
        let value = parse_digits(input.strip_suffix(suffix)?)?;
        let bytes = value.checked_mul(1u128 << shift)?;
        return Some(render_binary(bytes));
    }
    if let Some((suffix, exp)) = DECIMAL_SUFFIXES
        .iter()
        .find(|(suffix, _)| input.ends_with(suffix))
    {
        let value = parse_digits(input.strip_suffix(suffix)?)?;
        let bytes = value.checked_mul(10u128.pow(*exp))?;
        return Some(render_decimal_millis(bytes.checked_mul(1000)?));
    }
    let bytes = parse_digits(input)?;
    Some(render_decimal_millis(bytes.checked_mul(1000)?))
}

fn parse_digits(value: &str) -> Option<u128> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn render_decimal_millis(millis: u128) -> String {
    if millis == 0 {
        return "0".to_string();
    }
    for (suffix, exp) in DECIMAL_SUFFIXES {
        let scale = 10u128.pow(exp + 3);
        if millis % scale == 0 {
            return format!("{}{suffix}", millis / scale);
        }
    }
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{millis}m")
    }
}

fn render_binary(bytes: u128) -> String {
    if bytes == 0 {
        return "0".to_string();
    }
    for (suffix, shift) in BINARY_SUFFIXES {
        if bytes % (1u128 << shift) == 0 {
            return format!("{}{suffix}", bytes >> shift);
        }
    }
    render_decimal_millis(bytes * 1000)
}
