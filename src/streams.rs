//! Named output channels opened lazily on first use.
//!
//! Channels are identified by name, which by default is the path of the file
//! they write to. Asking for a channel that is already open returns the same
//! writer; asking for a new one creates it. Closing a channel that was never
//! opened is an internal-consistency error in the calling code.
//!
//! Hosts that need a different output mechanism (in-memory buffers, a host
//! logging system, ...) install their own [`StreamOpener`].

use crate::error::{ProxyError, ProxyResult};
use log::debug;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Creates the writer behind a newly opened channel.
pub type StreamOpener = Box<dyn Fn(&str) -> io::Result<Box<dyn Write + Send>> + Send>;

/// An open output channel.
pub struct OutputStream {
    name: String,
    writer: Box<dyn Write + Send>,
}

impl OutputStream {
    /// Name (usually the file path) of the channel.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream").field("name", &self.name).finish()
    }
}

fn open_file(name: &str) -> io::Result<Box<dyn Write + Send>> {
    let file = File::create(name)?;
    Ok(Box::new(BufWriter::new(file)))
}

/// The set of currently open output channels, in opening order.
pub struct OutputStreams {
    streams: Vec<OutputStream>,
    opener: StreamOpener,
}

impl Default for OutputStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OutputStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStreams")
            .field("names", &self.names())
            .finish()
    }
}

impl OutputStreams {
    /// Channels backed by buffered files named after the channel.
    pub fn new() -> Self {
        Self::with_opener(Box::new(open_file))
    }

    /// Channels backed by writers produced by `opener`.
    pub fn with_opener(opener: StreamOpener) -> Self {
        Self {
            streams: Vec::new(),
            opener,
        }
    }

    /// Returns the channel called `name`, opening it if needed.
    pub fn open(&mut self, name: &str) -> ProxyResult<&mut OutputStream> {
        if let Some(pos) = self.position(name) {
            return Ok(&mut self.streams[pos]);
        }
        let writer = (self.opener)(name).map_err(|source| ProxyError::File {
            path: name.to_string(),
            source,
        })?;
        debug!("Opened output stream \"{}\"", name);
        self.streams.push(OutputStream {
            name: name.to_string(),
            writer,
        });
        let last = self.streams.len() - 1;
        Ok(&mut self.streams[last])
    }

    /// Flushes and closes the channel called `name`.
    ///
    /// Closing a channel that is not open is a bug in the caller and leaves the
    /// channel list unchanged.
    pub fn close(&mut self, name: &str) -> ProxyResult<()> {
        let pos = self.position(name).ok_or_else(|| {
            ProxyError::Bug(format!(
                "trying to close output stream \"{}\" that wasn't open",
                name
            ))
        })?;
        let mut stream = self.streams.remove(pos);
        stream.flush().map_err(|source| ProxyError::File {
            path: name.to_string(),
            source,
        })?;
        debug!("Closed output stream \"{}\"", name);
        Ok(())
    }

    /// Returns true when a channel called `name` is open.
    pub fn is_open(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns true when no channel is open.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Names of the open channels in opening order.
    pub fn names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }

    /// Flushes every open channel.
    pub fn flush_all(&mut self) -> ProxyResult<()> {
        for s in &mut self.streams {
            s.writer.flush().map_err(|source| ProxyError::File {
                path: s.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Flushes and closes every open channel.
    pub fn close_all(&mut self) -> ProxyResult<()> {
        self.flush_all()?;
        self.streams.clear();
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.streams.iter().position(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_reuses_existing_channel() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("colvars.traj");
        let name = path.to_str().unwrap();
        let mut streams = OutputStreams::new();

        writeln!(streams.open(name).unwrap(), "first").unwrap();
        assert_eq!(streams.len(), 1);
        writeln!(streams.open(name).unwrap(), "second").unwrap();
        assert_eq!(streams.len(), 1);

        streams.close(name).unwrap();
        assert!(streams.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_close_removes_only_matching_channel() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.dat");
        let b = temp_dir.path().join("b.dat");
        let mut streams = OutputStreams::new();
        streams.open(a.to_str().unwrap()).unwrap();
        streams.open(b.to_str().unwrap()).unwrap();

        streams.close(a.to_str().unwrap()).unwrap();
        assert_eq!(streams.names(), vec![b.to_str().unwrap()]);
    }

    #[test]
    fn test_close_unknown_channel_is_bug() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.dat");
        let mut streams = OutputStreams::new();
        streams.open(a.to_str().unwrap()).unwrap();

        let err = streams.close("never_opened.dat").unwrap_err();
        assert!(matches!(err, ProxyError::Bug(_)));
        assert_eq!(streams.len(), 1);
    }

    #[test]
    fn test_unwritable_destination_is_file_error() {
        let temp_dir = TempDir::new().unwrap();
        let bad = temp_dir.path().join("missing_dir").join("out.dat");
        let mut streams = OutputStreams::new();

        let err = streams.open(bad.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ProxyError::File { .. }));
        assert!(streams.is_empty());
    }

    #[test]
    fn test_custom_opener() {
        let mut streams = OutputStreams::with_opener(Box::new(|_| Ok(Box::new(io::sink()))));
        write!(streams.open("memory").unwrap(), "discarded").unwrap();
        assert!(streams.is_open("memory"));
        streams.close_all().unwrap();
        assert!(!streams.is_open("memory"));
    }
}
