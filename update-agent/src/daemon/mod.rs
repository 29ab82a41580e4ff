//! Background execution: the update scheduler, signal handling and restart.

pub mod restart;
pub mod scheduler;
pub mod shutdown;

pub use scheduler::{Scheduler, SchedulerExit};
pub use shutdown::ShutdownCoordinator;
