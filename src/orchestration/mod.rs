pub mod coalescer;
pub mod service;

pub use coalescer::{GroupCoalescer, GroupSink};
pub use service::RelayService;
