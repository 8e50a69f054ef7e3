//! Catalogue of well-known module operations.
//!
//! Each catalogue entry knows its argument shape and the remote effect it
//! produces, which is what the idempotency check looks for before calling.
//! Operations outside the catalogue are accepted as [`Operation::Custom`]
//! provided the step declares its effect explicitly.
//!
//! | operation | args | effect slot |
//! |---|---|---|
//! | `grantRole` | role, holder | `role:{role}` = holder |
//! | `transferOwnership` | new holder | `role:owner` = new holder |
//! | `enableAssetClass` | class id, asset | `assetClass:{id}:{asset}` = true |
//! | `setDistributor` | identity | `distributor` |
//! | `setBondSource` | identity | `bondSource` |
//! | `enableRebaseSchedule` | start time | `rebaseSchedule` |
//! | `setParameter` | key, value | `param:{key}` |
//! | `setParameterAddress` | key, identity | `paramAddress:{key}` |
//! | `registerRoute` | in, out, hops | `route:{in}:{out}` |
//! | `setActiveWorker` | identity, mode | `worker:{identity}` |
//! | `approve` | spender, amount | `allowance:{caller}:{spender}` |
//! | `finalizeSale` | - | `saleFinalized` = true |
//! | `advanceRebase`, `depositAsset`, `pushSample`, `mint` | ... | receipt |

use std::fmt;

use ignite_core::{Identity, RoleName};

use crate::error::{Error, Result};
use crate::params::ParamValue;

/// A remote state change the executor can look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    /// Slot name on the target module.
    pub slot: String,
    /// Value the slot holds once the operation has been applied.
    pub value: ParamValue,
}

impl Effect {
    /// Effect of a one-shot operation recorded under an idempotency key.
    #[must_use]
    pub fn receipt(key: &str) -> Self {
        Self {
            slot: format!("receipt:{key}"),
            value: ParamValue::Bool(true),
        }
    }

    /// Returns the role assigned by this effect, if it is a role slot.
    #[must_use]
    pub fn role_assignment(&self) -> Option<(RoleName, &Identity)> {
        let role = self.slot.strip_prefix("role:")?;
        Some((RoleName::new(role), self.value.as_identity()?))
    }
}

/// Operation exposed by a remote module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Assign a role on the module.
    GrantRole,
    /// Hand the owner role to another identity.
    TransferOwnership,
    /// Whitelist an asset for a treasury class.
    EnableAssetClass,
    /// Point staking at its reward distributor.
    SetDistributor,
    /// Point staking at its bond depository.
    SetBondSource,
    /// Arm the rebase schedule.
    EnableRebaseSchedule,
    /// Trigger one rebase epoch.
    AdvanceRebase,
    /// Set a sale parameter.
    SetParameter,
    /// Set a sale parameter holding an identity.
    SetParameterAddress,
    /// Deposit an asset into the sale.
    DepositAsset,
    /// Close the genesis sale.
    FinalizeSale,
    /// Register a swap route.
    RegisterRoute,
    /// Enable a worker on the router.
    SetActiveWorker,
    /// Push an oracle sample.
    PushSample,
    /// Grant a token allowance.
    Approve,
    /// Mint tokens.
    Mint,
    /// Operation outside the catalogue.
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Integer,
    Numeric,
    Amount,
    Timestamp,
    Identity,
    IdentityList,
    Key,
    Role,
    Any,
}

impl Kind {
    fn accepts(self, value: &ParamValue) -> bool {
        match self {
            Self::Integer => matches!(value, ParamValue::Integer(_)),
            Self::Numeric => value.as_i128().is_some(),
            Self::Amount => matches!(value, ParamValue::Amount(_) | ParamValue::Integer(_)),
            Self::Timestamp => matches!(value, ParamValue::Timestamp(_)),
            Self::Identity => matches!(value, ParamValue::Identity(_)),
            Self::IdentityList => matches!(value, ParamValue::IdentityList(_)),
            Self::Key => matches!(value, ParamValue::Text(_) | ParamValue::Integer(_)),
            Self::Role => matches!(value, ParamValue::Text(_)),
            Self::Any => true,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Numeric => "a numeric value",
            Self::Amount => "an amount",
            Self::Timestamp => "a timestamp",
            Self::Identity => "an identity",
            Self::IdentityList => "an identity list",
            Self::Key => "a parameter key",
            Self::Role => "a role name",
            Self::Any => "a value",
        }
    }
}

impl Operation {
    /// Parses an operation name. Unknown names become [`Operation::Custom`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "grantRole" => Self::GrantRole,
            "transferOwnership" => Self::TransferOwnership,
            "enableAssetClass" => Self::EnableAssetClass,
            "setDistributor" => Self::SetDistributor,
            "setBondSource" => Self::SetBondSource,
            "enableRebaseSchedule" => Self::EnableRebaseSchedule,
            "advanceRebase" => Self::AdvanceRebase,
            "setParameter" => Self::SetParameter,
            "setParameterAddress" => Self::SetParameterAddress,
            "depositAsset" => Self::DepositAsset,
            "finalizeSale" => Self::FinalizeSale,
            "registerRoute" => Self::RegisterRoute,
            "setActiveWorker" => Self::SetActiveWorker,
            "pushSample" => Self::PushSample,
            "approve" => Self::Approve,
            "mint" => Self::Mint,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the wire name of the operation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::GrantRole => "grantRole",
            Self::TransferOwnership => "transferOwnership",
            Self::EnableAssetClass => "enableAssetClass",
            Self::SetDistributor => "setDistributor",
            Self::SetBondSource => "setBondSource",
            Self::EnableRebaseSchedule => "enableRebaseSchedule",
            Self::AdvanceRebase => "advanceRebase",
            Self::SetParameter => "setParameter",
            Self::SetParameterAddress => "setParameterAddress",
            Self::DepositAsset => "depositAsset",
            Self::FinalizeSale => "finalizeSale",
            Self::RegisterRoute => "registerRoute",
            Self::SetActiveWorker => "setActiveWorker",
            Self::PushSample => "pushSample",
            Self::Approve => "approve",
            Self::Mint => "mint",
            Self::Custom(name) => name,
        }
    }

    /// Returns true for operations outside the catalogue.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Expected argument kinds; the trailing bool marks a variadic tail.
    fn shape(&self) -> (&'static [Kind], bool) {
        match self {
            Self::GrantRole => (&[Kind::Role, Kind::Identity], false),
            Self::TransferOwnership | Self::SetDistributor | Self::SetBondSource => {
                (&[Kind::Identity], false)
            }
            Self::EnableAssetClass => (&[Kind::Integer, Kind::Identity], false),
            Self::EnableRebaseSchedule => (&[Kind::Timestamp], false),
            Self::AdvanceRebase | Self::FinalizeSale => (&[], false),
            Self::SetParameter => (&[Kind::Key, Kind::Any], false),
            Self::SetParameterAddress => (&[Kind::Key, Kind::Identity], false),
            Self::DepositAsset => (&[Kind::Identity, Kind::Amount, Kind::Amount], false),
            Self::RegisterRoute => (&[Kind::Identity, Kind::Identity, Kind::IdentityList], false),
            Self::SetActiveWorker => (&[Kind::Identity, Kind::Integer], false),
            Self::PushSample => (&[Kind::Integer, Kind::Numeric], true),
            Self::Approve | Self::Mint => (&[Kind::Identity, Kind::Amount], false),
            Self::Custom(_) => (&[], true),
        }
    }

    /// Checks argument count and types.
    ///
    /// Custom operations accept any arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on an arity or type mismatch.
    pub fn check_shape(&self, subject: &str, args: &[ParamValue]) -> Result<()> {
        if self.is_custom() {
            return Ok(());
        }
        let (kinds, variadic) = self.shape();
        let arity_ok = if variadic {
            args.len() >= kinds.len()
        } else {
            args.len() == kinds.len()
        };
        if !arity_ok {
            return Err(Error::validation(
                subject,
                format!(
                    "{} expects {}{} arguments, got {}",
                    self.as_str(),
                    if variadic { "at least " } else { "" },
                    kinds.len(),
                    args.len()
                ),
            ));
        }

        for (pos, value) in args.iter().enumerate() {
            let kind = kinds
                .get(pos)
                .or_else(|| if variadic { kinds.last() } else { None })
                .copied()
                .unwrap_or(Kind::Any);
            if !kind.accepts(value) {
                return Err(Error::validation(
                    subject,
                    format!(
                        "argument {pos} of {} must be {}, found {}",
                        self.as_str(),
                        kind.label(),
                        value.type_name()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Checks operation-specific value constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a zero approval or deposit.
    pub fn check_values(&self, subject: &str, args: &[ParamValue]) -> Result<()> {
        match self {
            Self::Approve => match args.get(1) {
                Some(amount) if amount.is_zero() => {
                    Err(Error::validation(subject, "approval amount must be non-zero"))
                }
                _ => Ok(()),
            },
            Self::DepositAsset => match args.get(1) {
                Some(amount) if amount.is_zero() => {
                    Err(Error::validation(subject, "deposit amount must be non-zero"))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Derives the remote effect of a catalogue operation.
    ///
    /// Returns `None` for custom operations, which must declare one.
    #[must_use]
    pub fn effect(&self, args: &[ParamValue], caller: &Identity, key: &str) -> Option<Effect> {
        let arg = |pos: usize| args.get(pos).cloned();
        let slot = |slot: String, value: Option<ParamValue>| {
            value.map(|value| Effect { slot, value })
        };

        match self {
            Self::GrantRole => slot(format!("role:{}", arg(0)?), arg(1)),
            Self::TransferOwnership => slot("role:owner".into(), arg(0)),
            Self::EnableAssetClass => slot(
                format!("assetClass:{}:{}", arg(0)?, arg(1)?),
                Some(ParamValue::Bool(true)),
            ),
            Self::SetDistributor => slot("distributor".into(), arg(0)),
            Self::SetBondSource => slot("bondSource".into(), arg(0)),
            Self::EnableRebaseSchedule => slot("rebaseSchedule".into(), arg(0)),
            Self::SetParameter => slot(format!("param:{}", arg(0)?), arg(1)),
            Self::SetParameterAddress => slot(format!("paramAddress:{}", arg(0)?), arg(1)),
            Self::RegisterRoute => slot(format!("route:{}:{}", arg(0)?, arg(1)?), arg(2)),
            Self::SetActiveWorker => slot(format!("worker:{}", arg(0)?), arg(1)),
            Self::Approve => slot(format!("allowance:{caller}:{}", arg(0)?), arg(1)),
            Self::FinalizeSale => slot("saleFinalized".into(), Some(ParamValue::Bool(true))),
            Self::AdvanceRebase | Self::DepositAsset | Self::PushSample | Self::Mint => {
                Some(Effect::receipt(key))
            }
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ParamValue {
        ParamValue::Identity(Identity::new(s))
    }

    #[test]
    fn names_round_trip_through_parse() {
        for name in [
            "grantRole",
            "transferOwnership",
            "enableAssetClass",
            "advanceRebase",
            "registerRoute",
            "pushSample",
        ] {
            assert_eq!(Operation::parse(name).as_str(), name);
        }
        assert_eq!(
            Operation::parse("createBondMarket"),
            Operation::Custom("createBondMarket".into())
        );
    }

    #[test]
    fn enable_asset_class_effect_is_keyed_by_class_and_asset() {
        let effect = Operation::EnableAssetClass
            .effect(&[ParamValue::Integer(8), id("0xX")], &Identity::new("op"), "k")
            .unwrap();
        assert_eq!(effect.slot, "assetClass:8:0xX");
        assert_eq!(effect.value, ParamValue::Bool(true));
    }

    #[test]
    fn grant_role_effect_exposes_assignment() {
        let effect = Operation::GrantRole
            .effect(
                &[ParamValue::Text("vault".into()), id("0xA")],
                &Identity::new("op"),
                "k",
            )
            .unwrap();
        let (role, holder) = effect.role_assignment().unwrap();
        assert_eq!(role, RoleName::vault());
        assert_eq!(holder.as_str(), "0xA");
    }

    #[test]
    fn one_shot_operations_use_receipts() {
        let effect = Operation::AdvanceRebase
            .effect(&[], &Identity::new("op"), "first-rebase")
            .unwrap();
        assert_eq!(effect.slot, "receipt:first-rebase");
        assert!(Operation::Custom("x".into()).effect(&[], &Identity::new("op"), "k").is_none());
    }

    #[test]
    fn shape_checks_arity_and_types() {
        let op = Operation::EnableAssetClass;
        assert!(op.check_shape("s", &[ParamValue::Integer(8), id("0xX")]).is_ok());
        assert!(op.check_shape("s", &[ParamValue::Integer(8)]).is_err());
        let err = op
            .check_shape("s", &[ParamValue::Bool(true), id("0xX")])
            .unwrap_err();
        assert!(err.to_string().contains("argument 0 of enableAssetClass must be an integer"));

        let push = Operation::PushSample;
        assert!(push.check_shape("s", &[ParamValue::Integer(1), ParamValue::Integer(5)]).is_ok());
        assert!(push
            .check_shape(
                "s",
                &[ParamValue::Integer(1), ParamValue::Amount(5), ParamValue::Integer(6)]
            )
            .is_ok());
        assert!(push.check_shape("s", &[ParamValue::Integer(1)]).is_err());
    }

    #[test]
    fn zero_approval_is_rejected() {
        let err = Operation::Approve
            .check_values("approve", &[id("0xS"), ParamValue::Amount(0)])
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(Operation::Approve
            .check_values("approve", &[id("0xS"), ParamValue::Amount(1)])
            .is_ok());
    }
}
