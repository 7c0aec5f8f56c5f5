use crate::domain::entities::agent::Agent;
use crate::domain::value_objects::ids::AgentId;
use crate::domain::value_objects::money::UsdcAmount;
use crate::domain::value_objects::timestamps::Timestamp;
use rust_decimal::Decimal;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: uuid::Uuid,
    pub wallet_address: Option<String>,
    pub total_earned: Decimal,
    pub claimed_total: i32,
    pub passed_total: i32,
    pub completion_rate: Option<f64>,
    pub reliability: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl AgentRow {
    pub fn from_agent(agent: &Agent) -> Self {
        Self {
            id: agent.id.0,
            wallet_address: agent.wallet_address.clone(),
            total_earned: agent.total_earned.as_decimal(),
            claimed_total: agent.claimed_total as i32,
            passed_total: agent.passed_total as i32,
            completion_rate: agent.completion_rate,
            reliability: agent.reliability,
            created_at: agent.created_at.as_inner(),
            updated_at: agent.updated_at.as_inner(),
        }
    }

    pub fn into_agent(self) -> Agent {
        Agent {
            id: AgentId(self.id),
            wallet_address: self.wallet_address,
            total_earned: UsdcAmount::new(self.total_earned),
            claimed_total: self.claimed_total.max(0) as u32,
            passed_total: self.passed_total.max(0) as u32,
            completion_rate: self.completion_rate,
            reliability: self.reliability,
            created_at: Timestamp::from(self.created_at),
            updated_at: Timestamp::from(self.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AgentRow;
    use crate::domain::entities::agent::Agent;
    use crate::domain::value_objects::ids::AgentId;

    #[test]
    fn given_agent_when_mapped_should_round_trip() {
        let mut agent = Agent::new(AgentId::new(), Some("0xabc".to_string()));
        agent.claimed_total = 5;
        agent.passed_total = 3;
        agent.completion_rate = Some(0.6);

        let row = AgentRow::from_agent(&agent);
        let back = row.into_agent();

        assert_eq!(back.id, agent.id);
        assert_eq!(back.wallet_address.as_deref(), Some("0xabc"));
        assert_eq!(back.claimed_total, 5);
        assert_eq!(back.passed_total, 3);
        assert_eq!(back.completion_rate, Some(0.6));
    }
}
