pub mod attempt_policy;
pub mod state_machine;
