//! Block exchange plumbing shared by single-block fetch paths.

pub mod notifications;

pub use notifications::{BUFFER_SIZE, PubSub, Subscription};
