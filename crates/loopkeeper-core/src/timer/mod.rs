mod clock;
mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sync::{overtime_seconds, sync, TimerMode, TimerReading};
