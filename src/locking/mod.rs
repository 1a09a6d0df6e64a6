//! Cross-process ownership locking
//!
//! - [`flock`]: non-blocking exclusive advisory locks on files
//! - [`ownership`]: the owning-VM record kept in a volume's lock file
//! - [`coordinator`]: acquires both locks around an operation

pub mod coordinator;
pub mod flock;
pub mod ownership;

pub use coordinator::LockCoordinator;
pub use flock::FileLock;
pub use ownership::OwnershipRecord;
