//! Role holders per module.
//!
//! At most one identity holds a given role on a given module. The registry
//! is seeded from the plan's initial holders and then mutated only by the
//! step in flight: a successful (or already observed) `grantRole` or
//! `transferOwnership` updates it before the next step is authorized.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ignite_core::{Identity, ModuleName, RoleName};

use crate::error::{Error, Result};

/// Initial holder of a role, as declared in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    /// Module the role applies to.
    pub module: ModuleName,
    /// Role name.
    pub role: RoleName,
    /// Holder identity.
    pub holder: Identity,
}

impl RoleAssignment {
    /// Creates a role assignment.
    #[must_use]
    pub fn new(module: impl Into<String>, role: RoleName, holder: impl Into<String>) -> Self {
        Self {
            module: ModuleName::new(module),
            role,
            holder: Identity::new(holder),
        }
    }
}

/// Which identity holds which role on which module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRegistry {
    holders: BTreeMap<(ModuleName, RoleName), Identity>,
}

impl RoleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with initial holders.
    #[must_use]
    pub fn seeded<'a>(assignments: impl IntoIterator<Item = &'a RoleAssignment>) -> Self {
        let mut registry = Self::new();
        for assignment in assignments {
            registry.record(&assignment.module, &assignment.role, assignment.holder.clone());
        }
        registry
    }

    /// Returns the current holder of a role.
    #[must_use]
    pub fn holder(&self, module: &ModuleName, role: &RoleName) -> Option<&Identity> {
        self.holders.get(&(module.clone(), role.clone()))
    }

    /// Returns true if `caller` holds `role` on `module`.
    #[must_use]
    pub fn authorize(&self, module: &ModuleName, role: &RoleName, caller: &Identity) -> bool {
        self.holder(module, role) == Some(caller)
    }

    /// Returns true if `caller` holds an admin role (owner or governor) on `module`.
    #[must_use]
    pub fn is_admin(&self, module: &ModuleName, caller: &Identity) -> bool {
        [RoleName::owner(), RoleName::governor()]
            .iter()
            .any(|role| self.authorize(module, role, caller))
    }

    /// Checks whether `caller` may grant `role` on `module`.
    ///
    /// Admins may always grant. Anyone may claim a role nobody holds yet,
    /// which is how modules are bootstrapped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] otherwise.
    pub fn check_grant(&self, module: &ModuleName, role: &RoleName, caller: &Identity) -> Result<()> {
        if self.is_admin(module, caller) || self.holder(module, role).is_none() {
            return Ok(());
        }
        Err(Error::Unauthorized {
            module: module.clone(),
            role: RoleName::owner(),
            caller: caller.clone(),
            detail: Some(format!("only an admin may reassign {role}")),
        })
    }

    /// Assigns `role` on `module` to `holder` on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if `caller` may not grant the role.
    pub fn grant(
        &mut self,
        module: &ModuleName,
        role: &RoleName,
        holder: Identity,
        caller: &Identity,
    ) -> Result<()> {
        self.check_grant(module, role, caller)?;
        self.record(module, role, holder);
        Ok(())
    }

    /// Checks whether `from` may hand the owner role of `module` over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCurrentHolder`] if `from` is not the recorded owner.
    pub fn check_transfer(&self, module: &ModuleName, from: &Identity) -> Result<()> {
        let role = RoleName::owner();
        let actual = self.holder(module, &role);
        if actual == Some(from) {
            return Ok(());
        }
        Err(Error::NotCurrentHolder {
            module: module.clone(),
            role,
            claimed: from.clone(),
            actual: actual.cloned(),
        })
    }

    /// Atomically reassigns the owner role of `module` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCurrentHolder`] if `from` is not the recorded owner;
    /// the registry is unchanged in that case.
    pub fn transfer_ownership(&mut self, module: &ModuleName, from: &Identity, to: Identity) -> Result<()> {
        self.check_transfer(module, from)?;
        self.record(module, &RoleName::owner(), to);
        Ok(())
    }

    /// Records a holder without any check. Used for seeding and for holders
    /// observed on the remote module.
    pub fn record(&mut self, module: &ModuleName, role: &RoleName, holder: Identity) {
        self.holders.insert((module.clone(), role.clone()), holder);
    }

    /// Iterates over all assignments in (module, role) order.
    pub fn iter(&self) -> impl Iterator<Item = (&ModuleName, &RoleName, &Identity)> {
        self.holders
            .iter()
            .map(|((module, role), holder)| (module, role, holder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn treasury() -> ModuleName {
        ModuleName::new("Treasury")
    }

    fn seeded() -> RoleRegistry {
        RoleRegistry::seeded(&[RoleAssignment::new("Treasury", RoleName::owner(), "0xOP")])
    }

    #[test]
    fn owner_may_grant_any_role() -> Result<()> {
        let mut roles = seeded();
        let op = Identity::new("0xOP");
        roles.grant(&treasury(), &RoleName::vault(), Identity::new("0xA"), &op)?;
        roles.grant(&treasury(), &RoleName::vault(), Identity::new("0xB"), &op)?;
        assert!(roles.authorize(&treasury(), &RoleName::vault(), &Identity::new("0xB")));
        assert!(!roles.authorize(&treasury(), &RoleName::vault(), &Identity::new("0xA")));
        Ok(())
    }

    #[test]
    fn unassigned_role_may_be_claimed_once() {
        let mut roles = RoleRegistry::new();
        let stranger = Identity::new("0xS");
        roles
            .grant(&treasury(), &RoleName::worker(), Identity::new("0xW"), &stranger)
            .unwrap();

        let err = roles
            .grant(&treasury(), &RoleName::worker(), Identity::new("0xX"), &stranger)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert_eq!(
            roles.holder(&treasury(), &RoleName::worker()).map(Identity::as_str),
            Some("0xW")
        );
    }

    #[test]
    fn transfer_requires_current_holder() {
        let mut roles = seeded();
        let err = roles
            .transfer_ownership(&treasury(), &Identity::new("0xNOT"), Identity::new("0xNEW"))
            .unwrap_err();
        assert!(matches!(err, Error::NotCurrentHolder { .. }));
        assert!(roles.authorize(&treasury(), &RoleName::owner(), &Identity::new("0xOP")));

        roles
            .transfer_ownership(&treasury(), &Identity::new("0xOP"), Identity::new("0xNEW"))
            .unwrap();
        assert!(roles.authorize(&treasury(), &RoleName::owner(), &Identity::new("0xNEW")));
        assert!(!roles.is_admin(&treasury(), &Identity::new("0xOP")));
    }

    #[test]
    fn roles_are_scoped_per_module() {
        let roles = seeded();
        let op = Identity::new("0xOP");
        assert!(roles.authorize(&treasury(), &RoleName::owner(), &op));
        assert!(!roles.authorize(&ModuleName::new("Staking"), &RoleName::owner(), &op));
    }
}
