pub mod codec;
pub mod io_stream;
pub mod block;
pub mod image;

pub use codec::{compress, decompress, CodecError, CodecOptions, ZlibCodec};
pub use io_stream::{Endian, InputStream, OutputStream, StreamBuf, StreamReader, StreamWriter};
pub use block::{FrameError, FrameHeader, read_framed_block, write_framed_block};
pub use image::{Image, ImageError, decode_image, encode_image};
