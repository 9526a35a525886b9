//! GitHub REST API response types
//!
//! Only the fields the exporter reads are modelled; unknown fields are ignored.
//! Billing quantities are decoded as `f64` since GitHub reports some of them
//! with a fractional part.

use serde::Deserialize;

// =============================================================================
// Billing
// =============================================================================

/// `GET /orgs/{org}/settings/billing/actions`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionsBilling {
    pub total_minutes_used: f64,
    pub total_paid_minutes_used: f64,
    pub included_minutes: f64,
    #[serde(default)]
    pub minutes_used_breakdown: MinutesUsedBreakdown,
}

/// Billed minutes per runner platform, multipliers already applied by GitHub
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MinutesUsedBreakdown {
    #[serde(rename = "UBUNTU", default)]
    pub ubuntu: f64,
    #[serde(rename = "MACOS", default)]
    pub macos: f64,
    #[serde(rename = "WINDOWS", default)]
    pub windows: f64,
}

/// `GET /orgs/{org}/settings/billing/packages`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackagesBilling {
    pub total_gigabytes_bandwidth_used: f64,
    pub total_paid_gigabytes_bandwidth_used: f64,
    pub included_gigabytes_bandwidth: f64,
}

/// `GET /orgs/{org}/settings/billing/shared-storage`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StorageBilling {
    pub days_left_in_billing_cycle: f64,
    pub estimated_paid_storage_for_month: f64,
    pub estimated_storage_for_month: f64,
}

// =============================================================================
// Repositories & Workflows
// =============================================================================

/// Entry of `GET /orgs/{org}/repos`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
}

/// `GET /repos/{owner}/{repo}/actions/workflows`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

/// Entry of a [`WorkflowList`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
}

/// `GET /repos/{owner}/{repo}/actions/workflows/{id}/timing`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowUsage {
    #[serde(default)]
    pub billable: WorkflowBillMap,
}

/// Billable time per platform; a platform without runs is absent
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowBillMap {
    #[serde(rename = "UBUNTU", default)]
    pub ubuntu: Option<WorkflowBill>,
    #[serde(rename = "MACOS", default)]
    pub macos: Option<WorkflowBill>,
    #[serde(rename = "WINDOWS", default)]
    pub windows: Option<WorkflowBill>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowBill {
    #[serde(default)]
    pub total_ms: u64,
}
