//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `factura_core` linkage.
//! - Report which store backend the current environment selects and whether
//!   it answers.

use factura_core::{open_store, StoreAdapter, StoreConfig};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    println!("factura_core ping={}", factura_core::ping());
    println!("factura_core version={}", factura_core::core_version());

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("factura_core config error={err}");
            return ExitCode::FAILURE;
        }
    };
    let store = match open_store(&config) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("factura_core store error={err}");
            return ExitCode::FAILURE;
        }
    };
    println!("factura_core backend={}", store.backend_tag());

    match tokio::time::timeout(config.timeout, store.list_customers()).await {
        Ok(Ok(customers)) => {
            println!("factura_core customers={}", customers.len());
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            eprintln!("factura_core probe error={err}");
            ExitCode::FAILURE
        }
        Err(_) => {
            eprintln!("factura_core probe error=timed out");
            ExitCode::FAILURE
        }
    }
}
