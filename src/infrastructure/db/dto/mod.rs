mod agent;
mod job;
mod submission;

pub use agent::AgentRow;
pub use job::JobRow;
pub use submission::SubmissionRow;
