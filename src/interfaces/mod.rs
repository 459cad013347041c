pub mod channel;
pub mod scheduler;
