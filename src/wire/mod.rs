//! Wire codec: type codes, signatures, the argument model, header
//! fields, and the message marshal/unmarshal implementation (spec §4.1).

pub mod arg;
pub mod header;
pub mod message;
pub mod signature;
pub mod typecode;

pub use arg::{Arg, ArgBuilder};
pub use header::{HeaderField, HeaderFieldTable};
pub use message::{Endian, Flags, Message, MessageType, SerialAllocator, MAX_HEADER_SIZE, MAX_PACKET_SIZE};
pub use signature::Signature;
pub use typecode::TypeCode;
