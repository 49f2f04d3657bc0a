use std::collections::BTreeMap;

use super::{FieldViolation, Rule};

pub const PASSWORD_MESSAGE: &str =
    "Password must be at least 8 characters long, contain a letter and a number";

/// Turns violations into one English message per field.
///
/// Pure and input-agnostic: any rule set built from [`Rule`] is covered
/// without touching this function. When a field carries several violations
/// the first one wins.
#[must_use]
pub fn translate(violations: &[FieldViolation]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for v in violations {
        out.entry(v.field.to_string())
            .or_insert_with(|| message(v.field, v.rule));
    }
    out
}

#[must_use]
pub fn message(field: &str, rule: Rule) -> String {
    let label = label(field);
    match rule {
        Rule::Required => format!("{label} is a required field"),
        Rule::MinLength(n) => format!(
            "{label} must be at least {n} {} in length",
            characters(n)
        ),
        Rule::MaxLength(n) => format!(
            "{label} must be a maximum of {n} {} in length",
            characters(n)
        ),
        Rule::Email => format!("{label} must be a valid email address"),
        Rule::OneOf(allowed) => format!("{label} must be one of [{}]", allowed.join(" ")),
        Rule::PasswordStrength => PASSWORD_MESSAGE.to_string(),
        Rule::Numeric => format!("{label} must be a valid numeric value"),
        Rule::Min(n) => format!("{label} must be {n} or greater"),
        Rule::Max(n) => format!("{label} must be {n} or less"),
    }
}

const fn characters(n: usize) -> &'static str {
    if n == 1 { "character" } else { "characters" }
}

/// `verified_email` -> `Verified email`
fn label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
