//! Decodes XRootD monitoring UDP datagrams into typed, packet-shaped
//! records.

mod decode;
mod error;
mod grammar;

pub use decode::decode_packet;
pub use error::ParseError;
pub use grammar::{parse_activity_info, parse_auth_info, parse_token_info, parse_user_info};
