pub mod event;
pub mod node;
pub mod order;

pub use event::*;
pub use node::*;
pub use order::*;
