//! Endian-aware binary stream reader/writer.
//!
//! A [`Serializer`] owns an in-memory byte stream plus a cursor. Fixed-width
//! primitives are byte-swapped on the way in and out whenever the selected
//! [`EndianOrder`] differs from the host's native order.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use core_types::{ErrorCode, HqError, HqResult};

/// Byte order applied to fixed-width primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndianOrder {
    /// Not a usable order; rejected by [`Serializer::set_endianness`]
    Unknown,
    /// Whatever the host CPU uses
    #[default]
    Native,
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl EndianOrder {
    /// Whether data in this order must be reversed on the current host.
    pub fn needs_swap(self) -> bool {
        match self {
            EndianOrder::Little => cfg!(target_endian = "big"),
            EndianOrder::Big => cfg!(target_endian = "little"),
            EndianOrder::Native | EndianOrder::Unknown => false,
        }
    }
}

/// Direction a serializer was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializerMode {
    /// Reads only; writes fail with `InvalidType`
    Reader,
    /// Reads and writes
    Writer,
}

/// In-memory byte stream with a cursor.
///
/// # Examples
///
/// ```
/// use bytecode_system::{EndianOrder, Serializer, SerializerMode};
///
/// let mut writer = Serializer::new(SerializerMode::Writer);
/// writer.set_endianness(EndianOrder::Big).unwrap();
/// writer.write_u32(0x0102_0304).unwrap();
/// assert_eq!(writer.as_bytes(), &[1, 2, 3, 4]);
///
/// let mut reader = Serializer::new(SerializerMode::Reader);
/// reader.load_buffer(writer.as_bytes()).unwrap();
/// reader.set_endianness(EndianOrder::Big).unwrap();
/// assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
/// ```
#[derive(Debug, Clone)]
pub struct Serializer {
    stream: Vec<u8>,
    position: usize,
    mode: SerializerMode,
    endianness: EndianOrder,
}

macro_rules! primitive_io {
    ($($write:ident, $read:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Writes one `", stringify!($ty), "` in the current byte order.")]
            pub fn $write(&mut self, value: $ty) -> HqResult<()> {
                self.write_data(&value.to_ne_bytes())
            }

            #[doc = concat!("Reads one `", stringify!($ty), "` in the current byte order.")]
            pub fn $read(&mut self) -> HqResult<$ty> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                self.read_data(&mut bytes)?;
                Ok(<$ty>::from_ne_bytes(bytes))
            }
        )*
    };
}

impl Serializer {
    /// Creates an empty stream in native byte order.
    pub fn new(mode: SerializerMode) -> Self {
        Self {
            stream: Vec::new(),
            position: 0,
            mode,
            endianness: EndianOrder::Native,
        }
    }

    /// The mode chosen at creation.
    pub fn mode(&self) -> SerializerMode {
        self.mode
    }

    /// The current byte order.
    pub fn endianness(&self) -> EndianOrder {
        self.endianness
    }

    /// Selects the byte order for subsequent primitive reads and writes.
    pub fn set_endianness(&mut self, endianness: EndianOrder) -> HqResult<()> {
        if endianness == EndianOrder::Unknown {
            return Err(HqError::new(ErrorCode::InvalidArg, "unknown endian order"));
        }
        self.endianness = endianness;
        Ok(())
    }

    /// Total stream length in bytes.
    pub fn stream_len(&self) -> usize {
        self.stream.len()
    }

    /// Current cursor.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor; it may sit at most one past the last byte.
    pub fn set_position(&mut self, position: usize) -> HqResult<()> {
        if position > self.stream.len() {
            return Err(HqError::new(
                ErrorCode::InvalidArg,
                format!("position {} past stream length {}", position, self.stream.len()),
            ));
        }
        self.position = position;
        Ok(())
    }

    /// Bytes between the cursor and the end of the stream.
    pub fn remaining(&self) -> usize {
        self.stream.len() - self.position
    }

    /// Replaces the stream with a copy of `buffer`.
    ///
    /// Readers start at the beginning; writers continue at the end.
    pub fn load_buffer(&mut self, buffer: &[u8]) -> HqResult<()> {
        if buffer.is_empty() {
            return Err(HqError::new(ErrorCode::InvalidArg, "empty buffer"));
        }
        self.stream.clear();
        self.stream.extend_from_slice(buffer);
        self.rewind_for_mode();
        Ok(())
    }

    /// Replaces the stream with the contents of a file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> HqResult<()> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|err| {
            HqError::new(
                ErrorCode::FailedToOpenFile,
                format!("{}: {}", path.display(), err),
            )
        })?;
        self.stream = contents;
        self.rewind_for_mode();
        Ok(())
    }

    /// Writes the whole stream to a file, truncating or appending.
    pub fn save_file(&self, path: impl AsRef<Path>, append: bool) -> HqResult<()> {
        let path = path.as_ref();
        let open_error = |err: std::io::Error| {
            HqError::new(
                ErrorCode::FailedToOpenFile,
                format!("{}: {}", path.display(), err),
            )
        };
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(open_error)?;
        file.write_all(&self.stream).map_err(open_error)
    }

    /// The whole stream.
    pub fn as_bytes(&self) -> &[u8] {
        &self.stream
    }

    /// Consumes the serializer, returning the stream.
    pub fn into_bytes(self) -> Vec<u8> {
        self.stream
    }

    /// Writes `bytes` as one primitive, swapping if the byte order requires it.
    pub fn write_data(&mut self, bytes: &[u8]) -> HqResult<()> {
        self.check_writable()?;
        let start = self.reserve_at_cursor(bytes.len());
        let dest = &mut self.stream[start..start + bytes.len()];
        dest.copy_from_slice(bytes);
        if self.endianness.needs_swap() {
            dest.reverse();
        }
        Ok(())
    }

    /// Reads one primitive into `dest`, swapping if the byte order requires it.
    pub fn read_data(&mut self, dest: &mut [u8]) -> HqResult<()> {
        self.read_buffer(dest)?;
        if self.endianness.needs_swap() {
            dest.reverse();
        }
        Ok(())
    }

    /// Writes raw bytes verbatim.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> HqResult<()> {
        self.check_writable()?;
        if bytes.is_empty() {
            return Err(HqError::new(ErrorCode::InvalidArg, "empty buffer"));
        }
        let start = self.reserve_at_cursor(bytes.len());
        self.stream[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Reads raw bytes verbatim.
    pub fn read_buffer(&mut self, dest: &mut [u8]) -> HqResult<()> {
        let end = self.position + dest.len();
        if end > self.stream.len() {
            return Err(HqError::new(
                ErrorCode::StreamEnd,
                format!(
                    "need {} bytes at position {}, stream has {}",
                    dest.len(),
                    self.position,
                    self.stream.len()
                ),
            ));
        }
        dest.copy_from_slice(&self.stream[self.position..end]);
        self.position = end;
        Ok(())
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) -> HqResult<()> {
        self.write_u8(u8::from(value))
    }

    /// Reads a one-byte boolean; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> HqResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    primitive_io! {
        write_i8, read_i8, i8;
        write_i16, read_i16, i16;
        write_i32, read_i32, i32;
        write_i64, read_i64, i64;
        write_u8, read_u8, u8;
        write_u16, read_u16, u16;
        write_u32, read_u32, u32;
        write_u64, read_u64, u64;
        write_f32, read_f32, f32;
        write_f64, read_f64, f64;
    }

    /// Writes a `u32` length followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> HqResult<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| HqError::new(ErrorCode::InvalidArg, "string longer than u32::MAX"))?;
        self.write_u32(len)?;
        if !value.is_empty() {
            self.write_buffer(value.as_bytes())?;
        }
        Ok(())
    }

    /// Reads a string written by [`Serializer::write_string`].
    pub fn read_string(&mut self) -> HqResult<String> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(HqError::new(
                ErrorCode::StreamEnd,
                format!("string of {} bytes exceeds remaining stream", len),
            ));
        }
        let mut bytes = vec![0u8; len];
        self.read_buffer(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|err| HqError::new(ErrorCode::InvalidData, format!("invalid UTF-8: {}", err)))
    }

    fn check_writable(&self) -> HqResult<()> {
        match self.mode {
            SerializerMode::Writer => Ok(()),
            SerializerMode::Reader => Err(HqError::new(
                ErrorCode::InvalidType,
                "serializer is in reader mode",
            )),
        }
    }

    /// Grows the stream so `len` bytes fit at the cursor, returning the start.
    fn reserve_at_cursor(&mut self, len: usize) -> usize {
        let start = self.position;
        let end = start + len;
        if end > self.stream.len() {
            self.stream.resize(end, 0);
        }
        self.position = end;
        start
    }

    fn rewind_for_mode(&mut self) {
        self.position = match self.mode {
            SerializerMode::Reader => 0,
            SerializerMode::Writer => self.stream.len(),
        };
    }
}
