//! An HPACK codec, RFC 7541 header compression for HTTP/2.
//!
//! The crate offers the two symmetric halves of the algorithm: an
//! [`Encoder`] turning header fields into opaque blocks and a [`Decoder`]
//! turning blocks back into `(name, value)` pairs, each maintaining the
//! per-connection dynamic table in lockstep with its peer. Decoding is
//! streaming and resumable: input may stop at any byte boundary and the
//! next call continues where it left off, with decoded octets handed out
//! through a callback instead of being buffered.
//!
//! ```rust
//! use hpack_codec::{Decoder, Encoder, FieldFlags};
//!
//! let mut encoder = Encoder::new(4096).unwrap();
//! let mut decoder = Decoder::new(4096).unwrap();
//!
//! let headers: &[(&[u8], &[u8])] = &[(b":method", b"GET"), (b"user-agent", b"hpack-codec")];
//! let mut block = Vec::new();
//! encoder
//!     .encode_list(
//!         headers,
//!         FieldFlags::huffman(),
//!         |event| {
//!             if let hpack_codec::Event::Data(d) = event {
//!                 block.extend_from_slice(d);
//!             }
//!         },
//!     )
//!     .unwrap();
//!
//! let headers = decoder.decode_list(&block).unwrap();
//! assert_eq!(headers[0], (b":method".to_vec(), b"GET".to_vec()));
//! ```

#[macro_use]
extern crate bitflags;

pub mod decoder;
pub mod encoder;
pub mod huffman;

mod error;
mod field;
mod integer;
mod table;
mod validate;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{HpackError, HpackResult, HuffmanDecoderError};
pub use field::{Event, FieldFlags, FieldName, HeaderField};
pub use huffman::HuffmanDecoder;
pub use table::{TableIter, DYNAMIC_TABLE_OFFSET, ENTRY_OVERHEAD};

/// 默认的header最大长度值
pub const DEFAULT_SETTINGS_HEADER_TABLE_SIZE: usize = 4_096;

/// The largest table size an instance will ever agree to.
pub const MAX_HEADER_TABLE_SIZE: usize = u16::MAX as usize;
