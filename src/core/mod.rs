pub mod checkpoint;
pub mod errors;
pub mod events;
pub mod models;
pub mod modes;
pub mod parallel;
pub mod pipeline;
pub mod state;
