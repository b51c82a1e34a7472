pub mod job;
pub mod record;
pub mod request;

pub use job::{Job, JobSnapshot, JobStatus, JobTally, JobUpdate};
pub use record::{CompanyContext, OutputRecord, ScoredKeyword, WorkItem};
pub use request::{FreestyleRequest, JobMode, ProcessRequest, ScoringRequest};
