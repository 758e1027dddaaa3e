/// Ordinal rating SonarQube assigns to reliability, security and
/// maintainability metrics. `A` is best, `E` is worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
}

impl Grade {
    /// Icon name under the report image directory (e.g. "a" -> a.png).
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a rating metric's `actualValue` to a grade.
///
/// The value is read as an integer (leading digits only, so "2.0" is 2).
/// Anything at or above 5 is `E`; 1 through 4 map to `A` through `D`.
/// Zero, negatives and unparsable input have no grade.
pub fn grade(actual_value: &str) -> Option<Grade> {
    let value = parse_leading_int(actual_value)?;
    if value >= 5 {
        return Some(Grade::E);
    }
    match value {
        1 => Some(Grade::A),
        2 => Some(Grade::B),
        3 => Some(Grade::C),
        4 => Some(Grade::D),
        _ => None,
    }
}

fn parse_leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Saturate absurdly long inputs to the worst grade rather than failing.
    let value = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * value)
}
