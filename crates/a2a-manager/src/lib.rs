//! The task manager: the single point through which tasks are created,
//! transitioned, canceled, and queried.

pub mod cancel_registry;
pub mod task_manager;

pub use cancel_registry::CancelRegistry;
pub use task_manager::TaskManager;
