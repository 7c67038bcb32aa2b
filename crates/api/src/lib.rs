//! Listener service: the demo front routes that enqueue work, and the
//! handlers the task queue and the scheduler deliver to.

pub mod app;
pub mod context;
pub mod middleware;
