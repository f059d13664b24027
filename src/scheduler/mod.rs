//! Request storage and periodic evaluation of registered metrics

mod builder;
mod requests;
#[allow(clippy::module_inception)]
mod scheduler;

pub use builder::SchedulerBuilder;
pub use requests::{RequestEntry, RequestTable};
pub use scheduler::MetricsScheduler;
