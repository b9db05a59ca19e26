//! Binary wire protocol and frame transport: little-endian primitives,
//! tagged messages with per-session voxel type tables, and length-prefixed
//! frames over async streams.

pub mod framing;
pub mod messages;
pub mod wire;

pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use messages::{
    CLIENT_TAG_UPDATE_POSITION, ClientMessage, MAX_TYPE_NAME_LEN, PositionUpdate,
    SERVER_TAG_SET_CHUNK, SERVER_TAG_SET_POSITION, ServerMessage, decode_client_message,
    decode_server_message, encode_set_chunk, encode_set_position, encode_update_position,
};
pub use wire::{WireError, WireReader, WireWriter};
