use std::fs::File;
use std::io::{self, BufReader, Cursor, LineWriter, Read, Write};
use std::net::TcpStream;
use std::path::Path;

use crate::error::{IotaError, IotaResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// The OS (or in-memory) resource behind a stream.
enum Handle {
    Stdin,
    Stdout,
    /// Files are unbuffered: every byte goes straight to the descriptor.
    FileIn(File),
    FileOut(File),
    SocketIn(BufReader<TcpStream>),
    /// Sockets are line-buffered.
    SocketOut(LineWriter<TcpStream>),
    MemoryIn(Cursor<Vec<u8>>),
    MemoryOut(Vec<u8>),
    Closed,
}

/// A byte stream owned by a `Value::Stream` heap slot.
///
/// Dropping the stream releases its handle, so a stream that is swept
/// without an explicit close still gives its descriptor back.
pub struct Stream {
    handle: Handle,
    /// One byte of lookahead for the reader.
    pushback: Option<u8>,
}

impl Stream {
    fn with_handle(handle: Handle) -> Self {
        Stream {
            handle,
            pushback: None,
        }
    }

    pub fn stdin() -> Self {
        Self::with_handle(Handle::Stdin)
    }

    pub fn stdout() -> Self {
        Self::with_handle(Handle::Stdout)
    }

    /// Open a file. Input streams create the file when it does not exist yet;
    /// output streams create or truncate it.
    pub fn open_file(path: &str, direction: Direction) -> IotaResult<Self> {
        let handle = match direction {
            Direction::Input => {
                if !Path::new(path).exists() {
                    File::create(path)
                        .map_err(|e| IotaError::Io(format!("cannot create '{}': {}", path, e)))?;
                }
                let file = File::open(path)
                    .map_err(|e| IotaError::Io(format!("cannot open '{}': {}", path, e)))?;
                Handle::FileIn(file)
            }
            Direction::Output => {
                let file = File::create(path)
                    .map_err(|e| IotaError::Io(format!("cannot create '{}': {}", path, e)))?;
                Handle::FileOut(file)
            }
        };
        Ok(Self::with_handle(handle))
    }

    /// Open a file for reading without creating it. Used for loading source.
    pub fn open_existing(path: &str) -> IotaResult<Self> {
        let file =
            File::open(path).map_err(|e| IotaError::Io(format!("cannot open '{}': {}", path, e)))?;
        Ok(Self::with_handle(Handle::FileIn(file)))
    }

    /// Connect a TCP socket to `host:port`.
    pub fn connect(host: &str, port: u16, direction: Direction) -> IotaResult<Self> {
        let socket = TcpStream::connect((host, port))
            .map_err(|e| IotaError::Io(format!("connection to {}:{} failed: {}", host, port, e)))?;
        let handle = match direction {
            Direction::Input => Handle::SocketIn(BufReader::new(socket)),
            Direction::Output => Handle::SocketOut(LineWriter::new(socket)),
        };
        Ok(Self::with_handle(handle))
    }

    /// An input stream over an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_handle(Handle::MemoryIn(Cursor::new(bytes.into())))
    }

    /// An output stream that collects everything written to it.
    pub fn buffer() -> Self {
        Self::with_handle(Handle::MemoryOut(Vec::new()))
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.handle, Handle::Closed)
    }

    /// Bytes written so far to an in-memory output stream.
    pub fn contents(&self) -> Option<&[u8]> {
        match &self.handle {
            Handle::MemoryOut(buf) => Some(buf),
            _ => None,
        }
    }

    /// Read one byte. `Ok(None)` at end of stream.
    pub fn read_byte(&mut self) -> IotaResult<Option<u8>> {
        if let Some(b) = self.pushback.take() {
            return Ok(Some(b));
        }
        match &mut self.handle {
            Handle::Stdin => read_one(&mut io::stdin().lock()),
            Handle::FileIn(file) => read_one(file),
            Handle::SocketIn(reader) => read_one(reader),
            Handle::MemoryIn(cursor) => read_one(cursor),
            Handle::Closed => Err(IotaError::Io("read from closed stream".into())),
            _ => Err(IotaError::Io("read from output stream".into())),
        }
    }

    pub fn peek_byte(&mut self) -> IotaResult<Option<u8>> {
        let b = self.read_byte()?;
        if let Some(b) = b {
            self.pushback = Some(b);
        }
        Ok(b)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> IotaResult<()> {
        match &mut self.handle {
            Handle::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()?;
                Ok(())
            }
            Handle::FileOut(file) => Ok(file.write_all(bytes)?),
            Handle::SocketOut(writer) => Ok(writer.write_all(bytes)?),
            Handle::MemoryOut(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Handle::Closed => Err(IotaError::Io("write to closed stream".into())),
            _ => Err(IotaError::Io("write to input stream".into())),
        }
    }

    /// Close the stream, flushing pending socket output.
    pub fn close(&mut self) -> IotaResult<()> {
        match &mut self.handle {
            Handle::Stdin | Handle::Stdout => {
                return Err(IotaError::Io("cannot close a standard stream".into()));
            }
            Handle::SocketOut(writer) => writer.flush()?,
            Handle::Closed => return Err(IotaError::Io("stream already closed".into())),
            _ => {}
        }
        self.handle = Handle::Closed;
        self.pushback = None;
        Ok(())
    }
}

fn read_one(reader: &mut impl Read) -> IotaResult<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_input_supports_lookahead() {
        let mut s = Stream::from_bytes("ab");
        assert_eq!(s.peek_byte().unwrap(), Some(b'a'));
        assert_eq!(s.read_byte().unwrap(), Some(b'a'));
        assert_eq!(s.peek_byte().unwrap(), Some(b'b'));
        assert_eq!(s.peek_byte().unwrap(), Some(b'b'));
        assert_eq!(s.read_byte().unwrap(), Some(b'b'));
        assert_eq!(s.peek_byte().unwrap(), None);
        assert_eq!(s.read_byte().unwrap(), None);
    }

    #[test]
    fn direction_is_enforced() {
        let mut input = Stream::from_bytes("x");
        assert!(matches!(input.write_bytes(b"y"), Err(IotaError::Io(_))));
        let mut output = Stream::buffer();
        assert!(matches!(output.read_byte(), Err(IotaError::Io(_))));
        output.write_bytes(b"hi").unwrap();
        assert_eq!(output.contents(), Some(&b"hi"[..]));
    }

    #[test]
    fn closed_streams_reject_io() {
        let mut s = Stream::from_bytes("x");
        s.close().unwrap();
        assert!(!s.is_open());
        assert!(s.read_byte().is_err());
        assert!(s.close().is_err());
    }

    #[test]
    fn standard_streams_cannot_be_closed() {
        assert!(Stream::stdout().close().is_err());
        assert!(Stream::stdin().close().is_err());
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("iota-stream-{}.txt", std::process::id()));
        let path = path.to_str().unwrap().to_string();
        let mut out = Stream::open_file(&path, Direction::Output).unwrap();
        out.write_bytes(b"(1 2)").unwrap();
        out.close().unwrap();

        let mut input = Stream::open_file(&path, Direction::Input).unwrap();
        let mut read = Vec::new();
        while let Some(b) = input.read_byte().unwrap() {
            read.push(b);
        }
        assert_eq!(read, b"(1 2)");
        std::fs::remove_file(&path).unwrap();
    }
}
