pub mod import;
pub mod notification;
pub mod task;

pub use import::{ImportError, ImportResult};
pub use notification::{Notification, NotificationStatus};
pub use task::{NewTask, Task, TaskInput, TaskPriority};
