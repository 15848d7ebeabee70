//! Work queue publishing: the contract plus in-process and broker transports.

pub mod http;
pub mod memory;
pub mod traits;

pub use http::HttpPublisher;
pub use memory::{MemoryPublisher, PublishedRecord};
pub use traits::Publisher;
