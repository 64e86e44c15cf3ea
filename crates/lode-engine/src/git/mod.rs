pub mod objects;
pub mod tracker;

pub use objects::GitRepository;
pub use tracker::GitTracker;
