//! AMF (Action Message Format) implementation
//!
//! AMF0 is the serialization carried by command messages. The session core
//! only reaches it through [`crate::protocol::command::CommandCodec`], so an
//! application may swap in a different codec.

pub mod amf0;
pub mod external;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use external::{ExternalHandler, ExternalHandlers};
pub use value::AmfValue;
