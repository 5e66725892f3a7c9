//! Shared test doubles for the Ordertrail workspace.

mod clock;
mod memory;
mod repository;

pub use clock::{FixedClock, SteppingClock};
pub use memory::InMemoryEventRepository;
pub use repository::{
    AppendCall, EmptyEventRepository, FailingEventRepository, RecordingEventRepository,
};
