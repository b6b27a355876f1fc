// External I/O operations module
pub mod instance; // Running daemon discovery and signaling
pub mod lock; // Low-level lock file operations
pub mod signals; // Unix signal handling
