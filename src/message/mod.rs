pub mod address;
pub mod context;
pub mod headers;
pub mod payload;

pub use address::Address;
pub use context::{BufferedContext, MessageContext, Side, StreamingContext};
pub use headers::MessageHeaders;
pub use payload::{Payload, PayloadError};
