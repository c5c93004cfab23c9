pub mod builder;
pub mod dedup;
pub mod event;
pub mod stats;

pub use dedup::EventSet;
pub use event::Event;
pub use stats::Stats;
