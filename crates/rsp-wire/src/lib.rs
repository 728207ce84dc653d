//! Wire layer of the GDB Remote Serial Protocol.
//!
//! Frames look like `$<payload>#<cc>`, where `<cc>` is the two-digit hex
//! additive checksum of the payload. Single `+`/`-` bytes acknowledge frames.
//! Inside a payload, `}<b>` stands for `b ^ 0x20` and `*<n>` repeats the
//! previous byte `n - ' ' + 3` times.
//!
//! This crate has no I/O: [`FrameParser`] is fed bytes and reports verdicts,
//! and the codec functions are pure transforms.

mod codec;
mod frame;
mod scan;

pub use codec::{
    ESCAPE, ESCAPE_XOR, RUN_LENGTH, checksum, encode_frame, escape_binary, hex_decode, hex_digit,
    hex_encode, hex_value,
};
pub use frame::{FrameParser, ParserState, Verdict};
pub use scan::Scanner;

/// Largest packet payload either side will send or accept.
pub const MAX_PACKET_LENGTH: usize = 4096;

/// Acknowledgement byte.
pub const ACK: u8 = b'+';

/// Negative acknowledgement byte; asks the peer to retransmit.
pub const NAK: u8 = b'-';
