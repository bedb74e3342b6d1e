//! Small tools that help the ergonomics of this crate.

pub(crate) mod logging;
pub(crate) mod serde_bridge;
