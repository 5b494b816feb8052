use std::io::{self, Read};

/// Forward-only supply of bytes for the decoder.
///
/// `read_exact` either fills the whole buffer or fails; running out of input
/// must surface as [`io::ErrorKind::UnexpectedEof`] so the decoder can tell a
/// short stream apart from a real I/O failure.
pub trait ByteSource {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Number of bytes consumed so far. Only used in diagnostics.
    fn position(&self) -> u64;
}

/// Adapts any [`Read`] into a [`ByteSource`], counting consumed bytes.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    position: u64,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteSource, StreamSource};
    use std::io::ErrorKind;

    #[test]
    fn counts_consumed_bytes() {
        let data = [1u8, 2, 3, 4, 5];
        let mut source = StreamSource::new(&data[..]);
        let mut buf = [0; 2];

        source.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(source.position(), 2);

        source.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
        assert_eq!(source.position(), 4);
    }

    #[test]
    fn short_read_is_unexpected_eof() {
        let data = [1u8];
        let mut source = StreamSource::new(&data[..]);
        let mut buf = [0; 2];

        let err = source.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert_eq!(source.position(), 0);
    }
}
