//! Line-delimited JSON decoding of watch responses.

use bytes::{Buf, BytesMut};

use super::ClientError;
use crate::objects::WatchEvent;

/// A live watch response, yielding one [`WatchEvent`] per JSON line.
pub struct WatchStream {
    response: reqwest::Response,
    buf: BytesMut,
    finished: bool,
}

impl WatchStream {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buf: BytesMut::new(),
            finished: false,
        }
    }

    /// Next frame, or `None` once the server closes the stream.
    pub async fn next(&mut self) -> Result<Option<WatchEvent>, ClientError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line = self.buf.split_to(pos);
                self.buf.advance(1);
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(serde_json::from_slice(&line)?));
            }

            if self.finished {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                let rest = self.buf.split();
                return Ok(Some(serde_json::from_slice(&rest)?));
            }

            match self.response.chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.finished = true,
            }
        }
    }
}
