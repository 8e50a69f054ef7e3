//! Names used to address remote modules and the roles they enforce.
//!
//! Three string newtypes keep the different namespaces apart at compile time:
//!
//! - [`Identity`]: an opaque, address-like identity of a remote party (a
//!   deployed module, an operator key, a token contract).
//! - [`ModuleName`]: the logical name a module is registered under in a plan
//!   (e.g. `Treasury`, `Staking`). Plans and steps only ever hold names; the
//!   identity is resolved on demand.
//! - [`RoleName`]: a named permission on a module (`owner`, `vault`, ...).
//!
//! Constructors are infallible so plan templates stay readable; plans call
//! `validate` on every name before anything executes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 128;

fn validate_name(kind: &'static str, value: &str, allow_space: bool) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidName {
            kind,
            value: value.to_string(),
            reason: "cannot be empty",
        });
    }
    if value.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName {
            kind,
            value: value.to_string(),
            reason: "longer than 128 bytes",
        });
    }
    if value.chars().any(|c| c.is_control() || (!allow_space && c.is_whitespace())) {
        return Err(Error::InvalidName {
            kind,
            value: value.to_string(),
            reason: "contains whitespace or control characters",
        });
    }
    Ok(())
}

/// Opaque identity of a remote party (module address, operator key, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the identity is non-empty and contains no whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the identity is malformed.
    pub fn validate(&self) -> Result<()> {
        validate_name("identity", &self.0, false)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Logical name of a module inside a bootstrap plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Creates a new module name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the name is non-empty and contains no whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is malformed.
    pub fn validate(&self) -> Result<()> {
        validate_name("module", &self.0, false)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Named permission on a module.
///
/// Role names are compared case-sensitively; the well-known roles are
/// lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    /// Creates a new role name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The module owner. Holds every administrative right.
    #[must_use]
    pub fn owner() -> Self {
        Self::new("owner")
    }

    /// Governance role; may grant roles like the owner.
    #[must_use]
    pub fn governor() -> Self {
        Self::new("governor")
    }

    /// Keeper/worker role for operational calls (rebase, price pushes).
    #[must_use]
    pub fn worker() -> Self {
        Self::new("worker")
    }

    /// Vault role, held by the treasury on the authority module.
    #[must_use]
    pub fn vault() -> Self {
        Self::new("vault")
    }

    /// Policy role for bond market tuning.
    #[must_use]
    pub fn policy() -> Self {
        Self::new("policy")
    }

    /// Returns true if holders of this role may grant other roles.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self.0.as_str(), "owner" | "governor")
    }

    /// Returns the role name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the role name is non-empty and contains no whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is malformed.
    pub fn validate(&self) -> Result<()> {
        validate_name("role", &self.0, false)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_roles_are_owner_and_governor() {
        assert!(RoleName::owner().is_admin());
        assert!(RoleName::governor().is_admin());
        assert!(!RoleName::worker().is_admin());
        assert!(!RoleName::new("Owner").is_admin());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(Identity::new("").validate().is_err());
        assert!(ModuleName::new("").validate().is_err());
        assert!(RoleName::new("").validate().is_err());
    }

    #[test]
    fn whitespace_in_names_is_rejected() {
        let err = ModuleName::new("Bond Depository").validate().unwrap_err();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn names_serialize_transparently() {
        let json = serde_json::to_string(&ModuleName::new("Treasury")).unwrap();
        assert_eq!(json, "\"Treasury\"");
        let identity: Identity = serde_json::from_str("\"0xBEEF\"").unwrap();
        assert_eq!(identity.as_str(), "0xBEEF");
    }
}
