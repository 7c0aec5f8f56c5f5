/// Submission caps enforced at submit time: a per-worker attempt limit and
/// a job-wide total cap.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    pub max_worker_attempts: u32,
    pub max_submissions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptRejection {
    WorkerLimitReached,
    JobCapReached,
}

impl AttemptPolicy {
    /// Check whether one more submission is admissible given the worker's
    /// prior attempt count and the job's total submission count.
    pub fn admit(
        &self,
        worker_attempts: u32,
        total_submissions: u32,
    ) -> Result<(), AttemptRejection> {
        if worker_attempts >= self.max_worker_attempts {
            return Err(AttemptRejection::WorkerLimitReached);
        }
        if total_submissions >= self.max_submissions {
            return Err(AttemptRejection::JobCapReached);
        }
        Ok(())
    }
}
