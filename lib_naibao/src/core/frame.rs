/// A websocket frame, independent of the server library carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Liveness ping.
    Ping,
    /// Liveness answer; refreshes the read deadline.
    Pong,
    Close,
}

impl Frame {
    /// Application payload bytes, for data frames only.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(t) => Some(t.as_bytes()),
            Frame::Binary(b) => Some(b),
            Frame::Ping | Frame::Pong | Frame::Close => None,
        }
    }

    /// A data frame for queued bytes: text when they are UTF-8.
    pub fn from_payload(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Binary(e.into_bytes()),
        }
    }
}
