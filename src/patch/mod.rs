pub mod engine;
pub mod mapper;
pub mod references;

pub use engine::{PatchError, PatchOutcome};
pub use references::InvalidPropertyReference;
