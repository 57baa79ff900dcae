use serde::{Deserialize, Serialize};

/// A customer organization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Identity of the organization.
    pub id: String,
    /// Identity at the authentication provider.
    #[serde(default)]
    pub clerk_org_id: String,
    /// Display name.
    pub name: String,
    /// The current plan.
    pub subscription_tier: SubscriptionTier,
    /// Number of uploaded documents.
    #[serde(default)]
    pub document_count: u64,
    /// Number of questions asked.
    #[serde(default)]
    pub query_count: u64,
    /// Storage used, in megabytes.
    #[serde(default)]
    pub storage_used_mb: f64,
    /// Creation time.
    #[serde(default)]
    pub created_at: String,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Aggregated organization statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrganizationStats {
    /// Number of documents.
    pub total_documents: u64,
    /// Number of indexed chunks.
    pub total_chunks: u64,
    /// Number of questions asked.
    pub total_queries: u64,
    /// Storage used, in megabytes.
    pub storage_used_mb: f64,
    /// Questions asked in the current billing month.
    pub queries_this_month: u64,
    /// The current plan.
    pub subscription_tier: SubscriptionTier,
}

/// Usage against plan limits. A negative limit means unlimited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Questions asked this period.
    pub queries_used: i64,
    /// Question limit.
    pub queries_limit: i64,
    /// Documents stored.
    pub documents_used: i64,
    /// Document limit.
    pub documents_limit: i64,
    /// Storage used, in megabytes.
    pub storage_used_mb: f64,
    /// Storage limit, in megabytes.
    pub storage_limit_mb: f64,
}

impl UsageStats {
    /// Questions left this period, or `None` when unlimited.
    #[inline]
    pub fn queries_remaining(&self) -> Option<i64> {
        remaining(self.queries_used, self.queries_limit)
    }

    /// Documents that can still be uploaded, or `None` when unlimited.
    #[inline]
    pub fn documents_remaining(&self) -> Option<i64> {
        remaining(self.documents_used, self.documents_limit)
    }
}

fn remaining(used: i64, limit: i64) -> Option<i64> {
    if limit < 0 {
        return None;
    }
    Some((limit - used).max(0))
}

/// Subscription plans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// The free plan.
    #[default]
    Free,
    /// The basic plan.
    Basic,
    /// The pro plan.
    Pro,
    /// The enterprise plan.
    Enterprise,
}

/// Quotas of a plan. `None` means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TierLimits {
    /// Questions per month.
    pub queries: Option<u32>,
    /// Stored documents.
    pub documents: Option<u32>,
    /// Storage, in megabytes.
    pub storage_mb: Option<u32>,
}

impl SubscriptionTier {
    /// Returns the quotas of this plan.
    pub fn limits(self) -> TierLimits {
        let (queries, documents, storage_mb) = match self {
            SubscriptionTier::Free => (Some(100), Some(10), Some(100)),
            SubscriptionTier::Basic => (Some(1_000), Some(100), Some(1_024)),
            SubscriptionTier::Pro => (Some(10_000), Some(500), Some(10_240)),
            SubscriptionTier::Enterprise => (None, None, None),
        };
        TierLimits {
            queries,
            documents,
            storage_mb,
        }
    }
}

/// Billing state of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid up.
    Active,
    /// A payment is overdue.
    PastDue,
    /// Canceled.
    Canceled,
    /// Payment failed for good.
    Unpaid,
}

/// The organization's subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// The plan.
    pub tier: SubscriptionTier,
    /// Billing state.
    pub status: SubscriptionStatus,
    /// End of the current billing period.
    #[serde(default)]
    pub current_period_end: Option<String>,
    /// Whether the subscription ends with the current period.
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// A hosted checkout page to upgrade the plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutResponse {
    /// Where to send the user.
    pub checkout_url: String,
    /// Identity of the checkout session.
    pub session_id: String,
}

/// A hosted billing portal page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortalSession {
    /// Where to send the user.
    pub url: String,
}
