pub mod datakitchen;
pub mod error;
pub mod events;
pub mod mock;
pub mod traits;

pub use datakitchen::{ClientSettings, DataKitchenClient};
pub use error::{EventSinkError, GatewayError};
pub use events::{EventsClient, EventsSettings};
pub use mock::{MockGateway, RecordingEventSink};
pub use traits::{EventSink, OrderGateway};
