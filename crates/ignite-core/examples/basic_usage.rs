//! Basic usage example demonstrating core ignite primitives.
//!
//! Run with: `cargo run --example basic_usage`

use ignite_core::canonical_json::to_canonical_string;
use ignite_core::error::Result;
use ignite_core::prelude::*;

fn main() -> Result<()> {
    // Name a module and the identity it is deployed at
    let treasury = ModuleName::new("Treasury");
    treasury.validate()?;
    let deployed_at = Identity::new("0xTREASURY");
    deployed_at.validate()?;
    println!("Module: {treasury} at {deployed_at}");

    // Roles checked before privileged calls
    for role in [RoleName::owner(), RoleName::vault(), RoleName::worker()] {
        println!("Role {role} (admin: {})", role.is_admin());
    }

    // Every run gets a sortable id
    let run_id = RunId::generate();
    println!("Run ID: {run_id} (created {})", run_id.created_at());

    // Canonical JSON is the input to fingerprints
    let canonical = to_canonical_string(&serde_json::json!({"b": 2, "a": 1}))
        .map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
    println!("Canonical: {canonical}");

    Ok(())
}
