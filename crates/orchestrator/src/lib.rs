pub mod batch;
pub mod error;
pub mod node_monitor;
pub mod order_monitor;
pub mod wait_loop;

// Re-export main types
pub use batch::{batch_size, into_batches};
pub use error::MonitorError;
pub use node_monitor::{NodeMonitor, NodeMonitorSettings};
pub use order_monitor::OrderRunMonitor;
pub use wait_loop::WaitLoop;
