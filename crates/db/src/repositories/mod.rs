pub mod job_repo;
pub mod result_repo;

pub use job_repo::JobRepo;
pub use result_repo::ResultRepo;
