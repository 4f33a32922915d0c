//! # Invoice Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the last completed reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum InvoicePhase {
    /// A pass is running for a spec generation that has not been observed yet
    #[default]
    Pending,
    /// All child objects are converged
    Success,
    /// The last pass failed; a retry is scheduled
    Failure,
}

impl InvoicePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoicePhase::Pending => "Pending",
            InvoicePhase::Success => "Success",
            InvoicePhase::Failure => "Failure",
        }
    }
}

impl fmt::Display for InvoicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Status of the Invoice resource
///
/// The sole externally observable outcome of a reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatus {
    /// Current phase: Pending, Success or Failure
    #[serde(default)]
    pub phase: InvoicePhase,
    /// Failure description; empty on success
    #[serde(default)]
    pub message: String,
    /// Public address of the invoice viewer; empty until an exposure route exists
    #[serde(default)]
    pub endpoint: String,
    /// Time of the last status transition (RFC3339)
    #[serde(default)]
    pub last_processed_time: Option<String>,
    /// Spec generation processed by the last completed pass
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl InvoiceStatus {
    /// Find a condition by type
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
