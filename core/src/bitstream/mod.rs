mod bit_reader;
mod rbsp;

pub use bit_reader::BitReader;
pub use rbsp::unescape_rbsp;
