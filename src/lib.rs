pub mod app;
pub mod cli;
pub mod config;
pub mod format;
pub mod item;
pub mod model;
pub mod search;
pub mod storage;
pub mod strings;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use item::{ItemProps, TaskItem};
pub use model::{DateField, Task, TaskId, TaskPatch};
