//! Services shared by all clients.

mod tasks;

pub use tasks::TaskService;
