use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::Result;
use crate::opts::Opts;

/// Socket a [`Conn`](super::Conn) talks over
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Open the socket `opts` points at; a Unix socket path wins over host and port
    #[tracing::instrument(skip_all)]
    pub fn connect(opts: &Opts) -> Result<Self> {
        #[cfg(unix)]
        if let Some(socket) = &opts.socket {
            return Ok(Self::Unix(UnixStream::connect(socket)?));
        }

        let stream = TcpStream::connect((opts.host.trim_matches(['[', ']']), opts.port))?;
        stream.set_nodelay(opts.tcp_nodelay)?;
        Ok(Self::Tcp(stream))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Self::Unix(s) => s.flush(),
        }
    }
}
