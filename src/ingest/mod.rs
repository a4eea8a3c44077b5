//! Frame ingestion.
//!
//! - `normalize`: color conversion from camera layouts to interleaved RGB
//! - `synthetic`: `stub://` camera used by the daemon and tests
//!
//! Camera device setup is not handled here. Real producers hand frames to the
//! scheduler as `FrameView`s from their own callbacks.

mod normalize;
pub mod synthetic;

pub use normalize::to_rgb;
pub use synthetic::{SourceStats, SyntheticConfig, SyntheticSource};
