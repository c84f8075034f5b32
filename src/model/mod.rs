pub mod encoding;
mod patch;
mod task;

pub use patch::TaskPatch;
pub use task::{DateField, Task, TaskId};
