//! Scenario vectors: the tier table as expected outcomes.
//!
//! One vector per membership combination. A vector says which operations
//! the principal must be able to perform; every other operation must fail
//! with exactly an authorization denial.

use serde::{Deserialize, Serialize};

use keygate_perms::{tier_table, AuthorizationTier, Operation, TierRow};

use crate::fixtures::ScenarioReport;

/// Expected behaviour for one tier-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioVector {
    pub label: String,
    pub full_access: bool,
    pub encrypt_only: bool,
    pub decrypt_only: bool,
    pub can_encrypt: bool,
    pub can_decrypt: bool,
}

impl ScenarioVector {
    pub fn from_row(row: &TierRow) -> Self {
        Self {
            label: row.label(),
            full_access: row.full_access,
            encrypt_only: row.encrypt_only,
            decrypt_only: row.decrypt_only,
            can_encrypt: row.tier.permits(Operation::Encrypt),
            can_decrypt: row.tier.permits(Operation::Decrypt),
        }
    }

    /// The tier-table row this vector describes.
    pub fn row(&self) -> TierRow {
        TierRow {
            full_access: self.full_access,
            encrypt_only: self.encrypt_only,
            decrypt_only: self.decrypt_only,
            tier: AuthorizationTier::from_membership(
                self.full_access,
                self.encrypt_only,
                self.decrypt_only,
            ),
        }
    }

    pub fn expects(&self, operation: Operation) -> bool {
        match operation {
            Operation::Encrypt => self.can_encrypt,
            Operation::Decrypt => self.can_decrypt,
        }
    }

    /// Check a report against this vector.
    ///
    /// Permitted operations must succeed. Forbidden ones must be denied,
    /// not failed for any other reason.
    pub fn verify(&self, report: &ScenarioReport) -> Result<(), String> {
        for operation in Operation::ALL {
            let outcome = report.outcome(operation);
            let ok = if self.expects(operation) {
                outcome.is_success()
            } else {
                outcome.is_denied()
            };
            if !ok {
                let expected = if self.expects(operation) {
                    "success"
                } else {
                    "AuthorizationDenied"
                };
                return Err(format!(
                    "{}: {operation} expected {expected}, got {outcome:?}",
                    self.label
                ));
            }
        }
        Ok(())
    }
}

/// Every row of the tier table.
pub fn all_scenarios() -> Vec<ScenarioVector> {
    tier_table().iter().map(ScenarioVector::from_row).collect()
}

/// The vectors as pretty JSON.
pub fn scenarios_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_scenarios())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Outcome;
    use keygate::ErrorKind;

    fn report(label: &str, encrypt: Outcome, decrypt: Outcome) -> ScenarioReport {
        ScenarioReport {
            label: label.into(),
            encrypt,
            decrypt,
        }
    }

    fn denied() -> Outcome {
        Outcome::Failed {
            kind: ErrorKind::AuthorizationDenied,
            code: Some("AccessDeniedException"),
        }
    }

    #[test]
    fn test_vector_table() {
        let vectors = all_scenarios();
        assert_eq!(vectors.len(), 8);

        let expected: Vec<(&str, bool, bool)> = vec![
            ("none", false, false),
            ("decrypt", false, true),
            ("encrypt", true, false),
            ("encrypt+decrypt", true, true),
            ("full", true, true),
            ("full+decrypt", true, true),
            ("full+encrypt", true, true),
            ("full+encrypt+decrypt", true, true),
        ];
        for (vector, (label, enc, dec)) in vectors.iter().zip(expected) {
            assert_eq!(vector.label, label);
            assert_eq!((vector.can_encrypt, vector.can_decrypt), (enc, dec), "{label}");
            assert_eq!(ScenarioVector::from_row(&vector.row()), *vector);
        }
    }

    #[test]
    fn test_verify_requires_exact_denial() {
        let vectors = all_scenarios();
        let encrypt_only = &vectors[2];
        assert!(encrypt_only
            .verify(&report("encrypt", Outcome::Succeeded, denied()))
            .is_ok());

        // A transport failure where a denial was expected is not acceptable.
        let transport = Outcome::Failed {
            kind: ErrorKind::Transport,
            code: Some("ThrottlingException"),
        };
        assert!(encrypt_only
            .verify(&report("encrypt", Outcome::Succeeded, transport))
            .is_err());

        assert!(encrypt_only
            .verify(&report("encrypt", Outcome::Corrupted, denied()))
            .is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let json = scenarios_json().unwrap();
        let parsed: Vec<ScenarioVector> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, all_scenarios());
    }
}
