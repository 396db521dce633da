pub mod command;
pub mod tool;
pub mod toolchain;

pub use tool::{ToolCommand, ToolOutcome, ToolRunner};
