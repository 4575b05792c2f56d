pub mod intake;
pub mod memory;
pub mod redis_queue;

pub use intake::{Intake, IntakeError, SubmissionTicket, SubmissionView};
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

pub use common::JobQueue;
