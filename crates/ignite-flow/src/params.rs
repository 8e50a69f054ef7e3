//! Typed configuration values consumed by steps.
//!
//! A [`ParameterBundle`] is fixed when the plan is built: values derived from
//! the wall clock ("one year after the sale opens") are computed once and
//! stored, so replaying the plan later replays the same values. Each entry
//! carries its own validation rules, checked by the executor immediately
//! before the step consuming it issues any remote call.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use ignite_core::Identity;

use crate::error::{Error, Result};

/// Upper bound of a basis-point value (100%).
pub const MAX_BASIS_POINTS: u32 = 10_000;

/// A typed parameter or argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ParamValue {
    /// Signed integer (ids, modes, counts).
    Integer(i64),
    /// Token amount in base units. Serialized as a decimal string.
    Amount(#[serde(with = "amount_string")] u128),
    /// Unix timestamp in seconds.
    Timestamp(i64),
    /// Ratio in basis points, `0..=10000`.
    BasisPoints(u32),
    /// Flag.
    Bool(bool),
    /// Address-like identity of a remote party.
    Identity(Identity),
    /// Ordered identities, e.g. the hops of a swap route.
    IdentityList(Vec<Identity>),
    /// Free-form text such as a role name or parameter key.
    Text(String),
}

impl ParamValue {
    /// Returns the type label used in error messages and plan files.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Amount(_) => "amount",
            Self::Timestamp(_) => "timestamp",
            Self::BasisPoints(_) => "basisPoints",
            Self::Bool(_) => "bool",
            Self::Identity(_) => "identity",
            Self::IdentityList(_) => "identityList",
            Self::Text(_) => "text",
        }
    }

    /// Returns the numeric value for integer-like variants.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Integer(v) | Self::Timestamp(v) => Some(i128::from(*v)),
            Self::Amount(v) => i128::try_from(*v).ok(),
            Self::BasisPoints(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    /// Returns the identity, if this is an identity value.
    #[must_use]
    pub const fn as_identity(&self) -> Option<&Identity> {
        match self {
            Self::Identity(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for numeric zero values.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.as_i128() == Some(0)
    }

    /// Checks constraints every value of this type must satisfy,
    /// independent of any per-key rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a basis-point value exceeds 10000 or
    /// a timestamp lies before `genesis`.
    pub fn check_intrinsic(&self, subject: &str, genesis: Option<i64>) -> Result<()> {
        match self {
            Self::BasisPoints(bps) if *bps > MAX_BASIS_POINTS => Err(Error::validation(
                subject,
                format!("basis points {bps} outside [0, {MAX_BASIS_POINTS}]"),
            )),
            Self::Timestamp(ts) => match genesis {
                Some(genesis) if *ts < genesis => Err(Error::validation(
                    subject,
                    format!("timestamp {ts} is before genesis {genesis}"),
                )),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Amount(v) => write!(f, "{v}"),
            Self::BasisPoints(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Identity(id) => write!(f, "{id}"),
            Self::IdentityList(ids) => {
                let joined: Vec<&str> = ids.iter().map(Identity::as_str).collect();
                write!(f, "{}", joined.join(">"))
            }
            Self::Text(s) => f.write_str(s),
        }
    }
}

mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|e| D::Error::custom(format!("invalid amount '{raw}': {e}")))
    }
}

/// A validation predicate attached to one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum Rule {
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// Numeric value must not be zero.
    NonZero,
    /// Numeric value must be strictly greater than another parameter's.
    MonotonicAfter {
        /// The earlier parameter.
        key: String,
    },
}

/// One named entry in a [`ParameterBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// The value.
    pub value: ParamValue,
    /// Rules checked before any step consuming the value executes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
}

/// Validated set of named configuration values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBundle {
    /// Protocol genesis; no timestamp value may precede it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis: Option<i64>,
    #[serde(default)]
    entries: BTreeMap<String, ParamEntry>,
}

impl ParameterBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the genesis timestamp.
    #[must_use]
    pub const fn with_genesis(mut self, genesis: i64) -> Self {
        self.genesis = Some(genesis);
        self
    }

    /// Adds a value without rules.
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: ParamValue) -> Self {
        self.with_rules(key, value, Vec::new())
    }

    /// Adds a value with validation rules.
    #[must_use]
    pub fn with_rules(mut self, key: impl Into<String>, value: ParamValue, rules: Vec<Rule>) -> Self {
        self.entries.insert(key.into(), ParamEntry { value, rules });
        self
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Returns true if the bundle defines `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bundle is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validates one entry against its rules and intrinsic constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming `key` if the key is unknown or any
    /// rule is violated.
    pub fn validate(&self, key: &str) -> Result<()> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| Error::validation(key, "unknown parameter"))?;
        entry.value.check_intrinsic(key, self.genesis)?;

        for rule in &entry.rules {
            match rule {
                Rule::Range { min, max } => {
                    let value = numeric(key, &entry.value)?;
                    if value < i128::from(*min) || value > i128::from(*max) {
                        return Err(Error::validation(
                            key,
                            format!("{value} outside [{min}, {max}]"),
                        ));
                    }
                }
                Rule::NonZero => {
                    if numeric(key, &entry.value)? == 0 {
                        return Err(Error::validation(key, "must be non-zero"));
                    }
                }
                Rule::MonotonicAfter { key: earlier } => {
                    let previous = self.get(earlier).ok_or_else(|| {
                        Error::validation(key, format!("references unknown parameter '{earlier}'"))
                    })?;
                    let value = numeric(key, &entry.value)?;
                    let previous = numeric(earlier, previous)?;
                    if value <= previous {
                        return Err(Error::validation(
                            key,
                            format!("{value} must be greater than {earlier} ({previous})"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates every entry, collecting all failures.
    ///
    /// Used by offline plan validation; execution validates per step.
    #[must_use]
    pub fn validate_all(&self) -> Vec<Error> {
        self.entries
            .keys()
            .filter_map(|key| self.validate(key).err())
            .collect()
    }
}

fn numeric(key: &str, value: &ParamValue) -> Result<i128> {
    value.as_i128().ok_or_else(|| {
        Error::validation(
            key,
            format!("rule requires a numeric value, found {}", value.type_name()),
        )
    })
}
