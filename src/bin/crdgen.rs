//! # CRD Generator
//!
//! Prints the `Gitea` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/gitea.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use gitea_operator::crd::Gitea;
use kube::core::CustomResourceExt;

fn main() {
    let crd = Gitea::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("# Change the Rust types in src/crd/ instead");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
