//! Multiplex socket layer (spec.md §2, §4.C): frames multiple logical
//! virtual sockets onto one physical byte stream.

pub mod frame;
pub mod socket;
pub mod stream;
pub mod virtual_socket;

pub use frame::{hash_key, salted_service_id_hash, FIRST_SENTINEL_SALT};
pub use socket::{IncomingConnectionSender, MultiplexSocket};
pub use stream::into_stream;
pub use virtual_socket::{VirtualSocket, VirtualSocketHandle};
