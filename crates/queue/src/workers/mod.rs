//! Job workers.

mod fan_out;

pub use fan_out::{FanOutWorkerContext, fan_out_worker};
