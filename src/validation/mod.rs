//! Declarative field validation.
//!
//! Input types describe their rule sets through [`Validate`] using a
//! [`Validator`]. Every field is checked; each field reports at most its
//! first failing rule, and [`translate`] renders the result as a
//! field-to-message map.

mod messages;
mod rules;

use std::collections::BTreeMap;
use std::fmt;

pub use messages::{PASSWORD_MESSAGE, message, translate};
pub use rules::{ROLES, Rule, is_email, is_strong_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub rule: Rule,
}

impl FieldViolation {
    #[must_use]
    pub const fn new(field: &'static str, rule: Rule) -> Self {
        Self { field, rule }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        translate(&self.violations)
    }

    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.to_map();
        let joined = map
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for ValidationErrors {}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<FieldViolation>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A string field that is always present; put [`Rule::Required`] first to reject "".
    pub fn field(&mut self, name: &'static str, value: &str, rules: &[Rule]) -> &mut Self {
        if let Some(rule) = rules.iter().copied().find(|r| !r.check_str(value)) {
            self.violations.push(FieldViolation::new(name, rule));
        }
        self
    }

    /// Shorthand for [`Validator::field`] with [`Rule::Required`] checked first.
    pub fn required(&mut self, name: &'static str, value: &str, rules: &[Rule]) -> &mut Self {
        if value.is_empty() {
            self.violations.push(FieldViolation::new(name, Rule::Required));
            return self;
        }
        self.field(name, value, rules)
    }

    /// An optional string field: absent values skip every rule.
    pub fn optional(&mut self, name: &'static str, value: Option<&str>, rules: &[Rule]) -> &mut Self {
        match value {
            Some(v) => self.field(name, v, rules),
            None => self,
        }
    }

    /// An optional number: absent values skip every rule.
    pub fn number(&mut self, name: &'static str, value: Option<i64>, rules: &[Rule]) -> &mut Self {
        if let Some(v) = value
            && let Some(rule) = rules.iter().copied().find(|r| !r.check_number(v))
        {
            self.violations.push(FieldViolation::new(name, rule));
        }
        self
    }

    /// An optional number still in its text form, as query strings deliver it.
    /// Empty text counts as absent; anything else must parse before `rules` apply.
    pub fn numeric(&mut self, name: &'static str, value: Option<&str>, rules: &[Rule]) -> &mut Self {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => match v.parse::<i64>() {
                Ok(n) => self.number(name, Some(n), rules),
                Err(_) => {
                    self.violations.push(FieldViolation::new(name, Rule::Numeric));
                    self
                }
            },
            None => self,
        }
    }

    /// A value that must be explicitly supplied, whatever it is.
    pub fn present<T>(&mut self, name: &'static str, value: Option<&T>) -> &mut Self {
        if value.is_none() {
            self.violations.push(FieldViolation::new(name, Rule::Required));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ValidationErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors {
                violations: std::mem::take(&mut self.violations),
            })
        }
    }
}
