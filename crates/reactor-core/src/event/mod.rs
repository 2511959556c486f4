pub mod model;
pub mod service;
pub mod store;

pub use model::{group_key, Event, EventBuilder};
pub use service::{EventService, PROCESS_EVENTS_HANDLER};
pub use store::EventStore;
