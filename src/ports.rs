pub mod push;
pub mod queue;
pub mod store;
pub mod time;

pub use self::push::{DeliveryError, PushSender};
pub use self::queue::{DelayQueue, Receipt, Received};
pub use self::store::ScheduleStore;
pub use self::time::TimeProvider;
