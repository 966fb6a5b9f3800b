//! Terms-of-use gate for exports.
//!
//! Acceptance is bound to one dataset id. Loading a new dataset rebinds the
//! gate and clears acceptance, so an earlier "yes" never carries over.

use uuid::Uuid;

/// Terms the user must accept before any export.
pub const TERMS_OF_USE: &str = "\
Data Export Terms and Conditions

By downloading data from this application, you acknowledge and agree to the following:

1. Data Usage: The exported data is intended for authorized business purposes only.

2. Confidentiality: You will maintain the confidentiality of any sensitive or proprietary \
information contained in the exported data.

3. Compliance: You will comply with all applicable data protection laws and regulations, \
including but not limited to GDPR, CCPA, and HIPAA (where applicable).

4. Security: You are responsible for securing the downloaded data and preventing \
unauthorized access.

5. No Redistribution: You will not redistribute, share, or publish the exported data \
without proper authorization.

6. Audit Trail: All data exports are logged and may be subject to audit for compliance purposes.

7. Access Rights: You confirm that you have the appropriate permissions and access rights \
to export this data.

8. Liability: Misuse of exported data may result in disciplinary action and/or legal consequences.

By accepting, you certify that you have read, understood, and agree to these terms.
";

/// Outcome of an acceptance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    /// false -> true; the only transition that is audited
    Accepted,
    /// true -> false
    Revoked,
    /// Same value as before, or the id did not match
    Unchanged,
}

/// Export gate state.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    accepted: bool,
    bound_dataset_id: Option<Uuid>,
}

impl ExportGate {
    /// Create a closed gate bound to nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebind to a freshly loaded dataset and close the gate.
    pub fn on_dataset_loaded(&mut self, dataset_id: Uuid) {
        self.accepted = false;
        self.bound_dataset_id = Some(dataset_id);
    }

    /// Record acceptance for `dataset_id`.
    ///
    /// A mismatched id is ignored.
    pub fn accept(&mut self, dataset_id: Uuid) -> GateTransition {
        self.set_accepted(dataset_id, true)
    }

    /// Withdraw acceptance for `dataset_id`.
    pub fn revoke(&mut self, dataset_id: Uuid) -> GateTransition {
        self.set_accepted(dataset_id, false)
    }

    /// Set acceptance to `accepted`, reporting which edge (if any) was crossed.
    pub fn set_accepted(&mut self, dataset_id: Uuid, accepted: bool) -> GateTransition {
        if self.bound_dataset_id != Some(dataset_id) {
            tracing::warn!(
                dataset_id = %dataset_id,
                bound = ?self.bound_dataset_id,
                "Ignoring terms change for a dataset that is not loaded"
            );
            return GateTransition::Unchanged;
        }
        let transition = match (self.accepted, accepted) {
            (false, true) => GateTransition::Accepted,
            (true, false) => GateTransition::Revoked,
            _ => GateTransition::Unchanged,
        };
        self.accepted = accepted;
        transition
    }

    /// Check whether exporting `dataset_id` is permitted.
    pub fn is_export_allowed(&self, dataset_id: Uuid) -> bool {
        self.accepted && self.bound_dataset_id == Some(dataset_id)
    }

    /// Whether the gate is currently open for its bound dataset.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// The dataset id the gate is bound to.
    pub fn bound_dataset_id(&self) -> Option<Uuid> {
        self.bound_dataset_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_text_covers_audit_and_redistribution() {
        assert!(TERMS_OF_USE.starts_with("Data Export Terms and Conditions"));
        assert!(TERMS_OF_USE.contains("6. Audit Trail"));
        assert!(TERMS_OF_USE.contains("5. No Redistribution"));
        assert!(!TERMS_OF_USE.contains("  "));
    }

    #[test]
    fn test_new_gate_is_closed() {
        let gate = ExportGate::new();
        assert!(!gate.is_export_allowed(Uuid::new_v4()));
        assert_eq!(gate.bound_dataset_id(), None);
    }

    #[test]
    fn test_accept_opens_for_bound_dataset_only() {
        let mut gate = ExportGate::new();
        let id = Uuid::new_v4();
        gate.on_dataset_loaded(id);

        assert_eq!(gate.accept(id), GateTransition::Accepted);
        assert!(gate.is_export_allowed(id));
        assert!(!gate.is_export_allowed(Uuid::new_v4()));
    }

    #[test]
    fn test_accept_wrong_id_is_noop() {
        let mut gate = ExportGate::new();
        let id = Uuid::new_v4();
        gate.on_dataset_loaded(id);

        assert_eq!(gate.accept(Uuid::new_v4()), GateTransition::Unchanged);
        assert!(!gate.is_accepted());
    }

    #[test]
    fn test_redundant_accept_is_unchanged() {
        let mut gate = ExportGate::new();
        let id = Uuid::new_v4();
        gate.on_dataset_loaded(id);

        assert_eq!(gate.accept(id), GateTransition::Accepted);
        assert_eq!(gate.accept(id), GateTransition::Unchanged);
        assert_eq!(gate.revoke(id), GateTransition::Revoked);
        assert_eq!(gate.revoke(id), GateTransition::Unchanged);
        assert_eq!(gate.accept(id), GateTransition::Accepted);
    }

    #[test]
    fn test_new_dataset_resets_acceptance() {
        let mut gate = ExportGate::new();
        let first = Uuid::new_v4();
        gate.on_dataset_loaded(first);
        gate.accept(first);

        let second = Uuid::new_v4();
        gate.on_dataset_loaded(second);
        assert!(!gate.is_export_allowed(second));
        assert!(!gate.is_export_allowed(first));
    }
}
