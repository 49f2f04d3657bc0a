use regex::Regex;
use std::sync::OnceLock;

pub const ROLES: &[&str] = &["user", "admin"];

/// A single constraint a field can violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    /// Minimum string length in characters.
    MinLength(usize),
    /// Maximum string length in characters.
    MaxLength(usize),
    Email,
    OneOf(&'static [&'static str]),
    /// At least one ASCII letter and one ASCII digit.
    PasswordStrength,
    /// Text that parses as a whole number.
    Numeric,
    /// Inclusive lower bound for numbers.
    Min(i64),
    /// Inclusive upper bound for numbers.
    Max(i64),
}

impl Rule {
    /// Checks a present string value. `Required` fails only on the empty string.
    #[must_use]
    pub fn check_str(self, value: &str) -> bool {
        match self {
            Self::Required => !value.is_empty(),
            Self::MinLength(n) => value.chars().count() >= n,
            Self::MaxLength(n) => value.chars().count() <= n,
            Self::Email => is_email(value),
            Self::OneOf(allowed) => allowed.contains(&value),
            Self::PasswordStrength => is_strong_password(value),
            Self::Numeric => value.parse::<i64>().is_ok(),
            Self::Min(_) | Self::Max(_) => true,
        }
    }

    #[must_use]
    pub const fn check_number(self, value: i64) -> bool {
        match self {
            Self::Min(n) => value >= n,
            Self::Max(n) => value <= n,
            _ => true,
        }
    }
}

#[must_use]
pub fn is_email(value: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("Invalid regex")
    });

    value.len() <= 254 && re.is_match(value)
}

#[must_use]
pub fn is_strong_password(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_alphabetic()) && value.chars().any(|c| c.is_ascii_digit())
}
