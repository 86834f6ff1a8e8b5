//! Scripted in-process printer for tests.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::protocol::{FRAME_MAGIC, FRAME_SIZE, Frame, decode_frame};

/// A request as seen by the printer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Request {
    Command(String),
    Frame(Frame),
}

impl Request {
    pub(crate) fn command(&self) -> Option<&str> {
        match self {
            Self::Command(c) => Some(c),
            Self::Frame(_) => None,
        }
    }
}

/// What the printer does with a request.
pub(crate) enum Reply {
    Text(String),
    /// Close the connection without answering.
    Hangup,
    /// Stay silent for a while, then close.
    Stall(Duration),
}

impl Reply {
    pub(crate) fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Replies of a healthy printer.
pub(crate) fn healthy(request: &Request) -> Reply {
    let text = match request {
        Request::Frame(_) => "ok\r\n",
        Request::Command(c) if c.starts_with("~M601") => "CMD M601 Received.\r\nControl Success.\r\nok\r\n",
        Request::Command(c) if c.starts_with("~M650") => "CMD M650 Received.\r\nX: 1.0 Y: 0.5\r\nok\r\n",
        Request::Command(c) if c.starts_with("~M28") => "CMD M28 Received.\r\nWriting to file: 0:/user/x.g\r\nok\r\n",
        Request::Command(c) if c.starts_with("~M29") => "CMD M29 Received.\r\nDone saving file.\r\nok\r\n",
        Request::Command(c) if c.starts_with("~M23") => "CMD M23 Received.\r\nFile opened: x.g Size: 12\r\nok\r\n",
        Request::Command(_) => "CMD Unknown\r\n",
    };
    Reply::text(text)
}

/// Serve one connection on loopback, answering with `reply`.
///
/// Returns the port and a handle yielding every request received.
pub(crate) fn spawn_printer<F>(mut reply: F) -> (u16, JoinHandle<Vec<Request>>)
where
    F: FnMut(&Request) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        let (mut sock, _) = listener.accept().unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        while let Some(request) = read_request(&mut sock) {
            let answer = reply(&request);
            requests.push(request);
            match answer {
                Reply::Text(text) => sock.write_all(text.as_bytes()).unwrap(),
                Reply::Hangup => break,
                Reply::Stall(pause) => {
                    thread::sleep(pause);
                    break;
                }
            }
        }
        requests
    });

    (port, handle)
}

fn read_request(sock: &mut impl Read) -> Option<Request> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; FRAME_SIZE];

    loop {
        let n = sock.read(&mut tmp).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);

        if buf.len() >= 4 && buf[..4] == FRAME_MAGIC {
            if buf.len() >= FRAME_SIZE {
                return Some(Request::Frame(decode_frame(&buf).unwrap()));
            }
        } else if buf.ends_with(b"\r\n") {
            return Some(Request::Command(String::from_utf8(buf).unwrap()));
        }
    }
}
