use crate::domain::value_objects::ids::AgentId;
use crate::domain::value_objects::money::UsdcAmount;
use crate::domain::value_objects::timestamps::Timestamp;

/// An identity capable of posting or working jobs. Never deleted.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub wallet_address: Option<String>,
    pub total_earned: UsdcAmount,
    pub claimed_total: u32,
    pub passed_total: u32,
    pub completion_rate: Option<f64>,
    pub reliability: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Agent {
    pub fn new(id: AgentId, wallet_address: Option<String>) -> Self {
        let now = Timestamp::now_utc();
        Self {
            id,
            wallet_address,
            total_earned: UsdcAmount::ZERO,
            claimed_total: 0,
            passed_total: 0,
            completion_rate: None,
            reliability: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Completion rate derived from claim/pass history. `None` until the
    /// agent has claimed at least once.
    pub fn derived_completion_rate(claimed_total: u32, passed_total: u32) -> Option<f64> {
        if claimed_total == 0 {
            return None;
        }
        Some(f64::from(passed_total) / f64::from(claimed_total))
    }

    /// `true` when the agent clears the given reputation floor. Agents with
    /// no history yet are allowed through.
    pub fn meets_reputation(&self, minimum: Option<f64>) -> bool {
        match (minimum, self.completion_rate) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(min), Some(rate)) => rate >= min,
        }
    }
}
