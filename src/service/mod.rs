pub mod clock;
pub mod controller;
pub mod loop_worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::SchedulerController;
pub use loop_worker::{scheduler_loop, ScheduleWorker};
