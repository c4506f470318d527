//! The resident dispatcher: entry/exit discipline, private stack, idle
//! queue, and vector management.

pub mod dispatcher;
pub mod idle;
pub mod stack;
pub mod vectors;

pub use dispatcher::DispatcherState;
pub use idle::{IDLE_BATCH, IdleItem, IdleQueue};
pub use stack::{SavedStack, StackHome};
pub use vectors::{InstallState, MuxFunction, MuxReply, ResidentEntries, UninstallError};
