//! # Keygate Testkit
//!
//! Verification harness for Keygate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Scenario vectors**: every grant-list combination with the operations
//!   it must and must not permit
//! - **Fixtures**: disposable key/principal pairings that tear themselves
//!   down on drop
//! - **Generators**: proptest strategies for plaintexts, contexts and
//!   grant configurations
//!
//! ## Scenario Table
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keygate_kms::MemoryKms;
//! use keygate_testkit::fixtures::Scenario;
//! use keygate_testkit::vectors::all_scenarios;
//! use keygate_testkit::HarnessConfig;
//!
//! async fn run() {
//!     let kms = Arc::new(MemoryKms::new());
//!     let config = HarnessConfig::from_env().unwrap();
//!     for vector in all_scenarios() {
//!         let scenario = Scenario::provision(&kms, &config, vector.row()).unwrap();
//!         let report = scenario.exercise(b"probe payload").await.unwrap();
//!         vector.verify(&report).unwrap();
//!     }
//! }
//! ```
//!
//! ## Environment
//!
//! | variable | meaning | default |
//! |----------|---------|---------|
//! | `KEYGATE_LOG` | tracing filter for [`init_tracing`] | `warn` |
//! | `KEYGATE_TEST_REGION` | region scenarios provision in | `us-west-1` |
//! | `KEYGATE_KEEP_AFTER` | keep keys and roles after a scenario | off |
//! | `KEYGATE_TEST_ROLE` | identity that administers keys and assumes probe roles | `role/keygate-test-runner` |

use std::sync::Once;

use keygate_core::Principal;
use tracing_subscriber::EnvFilter;

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{Outcome, ProbeRoleFixture, Scenario, ScenarioReport};
pub use vectors::{all_scenarios, ScenarioVector};

/// Account of the in-memory key service used by the harness.
pub const TEST_ACCOUNT: &str = "111122223333";

/// Region used when `KEYGATE_TEST_REGION` is unset.
pub const DEFAULT_REGION: &str = "us-west-1";

/// Install a tracing subscriber for tests.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("KEYGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A role identifier in the harness account.
pub fn test_principal(name: &str) -> keygate_core::Result<Principal> {
    Principal::new(format!("arn:aws:iam::{TEST_ACCOUNT}:role/{name}"))
}

/// Harness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub region: String,
    /// Skip teardown so provisioned keys can be inspected.
    pub keep_after: bool,
    /// The identity running the harness.
    pub caller: Principal,
}

impl HarnessConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> keygate_core::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> keygate_core::Result<Self> {
        let region = lookup("KEYGATE_TEST_REGION")
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let keep_after = lookup("KEYGATE_KEEP_AFTER").is_some_and(|v| is_truthy(&v));
        let caller = match lookup("KEYGATE_TEST_ROLE") {
            Some(role) => Principal::new(role)?,
            None => test_principal("keygate-test-runner")?,
        };

        Ok(Self {
            region,
            keep_after,
            caller,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
