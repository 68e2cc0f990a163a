//! Job definitions.

mod fan_out;

pub use fan_out::FanOutJob;
