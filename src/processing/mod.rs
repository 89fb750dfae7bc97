//! Signal processing module
//!
//! - [`smoother`]: per-channel low-pass filtering on the acquisition side
//! - [`window`]: retention policy for the consumer's view of recent samples

pub mod smoother;
pub mod window;

pub use smoother::{smoother_for_window, MovingAverage, PassThrough, RingAverage, Smoother};
pub use window::{Retention, Window};
