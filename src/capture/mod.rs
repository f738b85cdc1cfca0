pub mod audio;
pub mod frame;
pub mod orchestrator;
pub mod state;
pub mod store;
