//! # CRD Generator
//!
//! Generates the `DopplerSecret` CustomResourceDefinition YAML from the Rust
//! type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/dopplersecret.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use doppler_secrets_controller::crd::DopplerSecret;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = DopplerSecret::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
