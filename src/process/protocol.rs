//! Line-oriented JSON framing between the parent and its worker processes.
//!
//! Every frame is one line: [`FRAME_MARKER`] followed by a JSON document.
//! Anything else on the worker's stdout (a stray `println!` inside a task) is
//! skipped by the reader.

use crate::error::{Error, Result};
use crate::executor::PanicInfo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};

pub const FRAME_MARKER: &str = "\u{1e}crun ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub task: String,
    pub item: Value,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub reply: Reply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum Reply {
    Ok(Value),
    Err(Value),
    Panic(PanicInfo),
    Transfer(String),
}

/// Write one frame with a single `write_all`, so a writer that locks per
/// call (such as `io::Stdout`) is only held for the frame itself.
pub fn write_frame<W: Write, M: Serialize>(writer: &mut W, message: &M) -> Result<()> {
    let mut frame = FRAME_MARKER.as_bytes().to_vec();
    serde_json::to_writer(&mut frame, message)?;
    frame.push(b'\n');

    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read the next frame, or `None` at end of stream.
pub fn read_frame<R: BufRead, M: DeserializeOwned>(reader: &mut R) -> Result<Option<M>> {
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(_) => {
                tracing::debug!(bytes = buf.len(), "skipping non-UTF-8 output from worker");
                continue;
            }
        };

        match line.find(FRAME_MARKER) {
            Some(start) => {
                let json = line[start + FRAME_MARKER.len()..].trim_end();
                return serde_json::from_str(json)
                    .map(Some)
                    .map_err(|e| Error::protocol(format!("malformed frame: {}", e)));
            }
            None => {
                tracing::debug!(line = line.trim_end(), "skipping non-frame output from worker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_frames_are_read_back() {
        let mut buf = Vec::new();
        let request = Request {
            id: 3,
            task: "square".into(),
            item: json!(4),
            args: json!(null),
        };
        write_frame(&mut buf, &request).unwrap();

        let mut reader = Cursor::new(buf);
        let read: Option<Request> = read_frame(&mut reader).unwrap();
        assert_eq!(read, Some(request));

        let eof: Option<Request> = read_frame(&mut reader).unwrap();
        assert!(eof.is_none());
    }

    #[test]
    fn test_noise_is_skipped() {
        let mut buf = b"hello from a task\n".to_vec();
        buf.extend_from_slice(b"partial line without newline then ");
        write_frame(
            &mut buf,
            &Response {
                id: 9,
                reply: Reply::Ok(json!(81)),
            },
        )
        .unwrap();

        let read: Option<Response> = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read.unwrap().reply, Reply::Ok(json!(81)));
    }

    #[test]
    fn test_binary_noise_is_skipped() {
        let mut buf = vec![0xff, 0xfe, b'x', b'\n'];
        write_frame(
            &mut buf,
            &Response {
                id: 2,
                reply: Reply::Ok(json!(4)),
            },
        )
        .unwrap();

        let read: Option<Response> = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read.unwrap().id, 2);
    }

    /// Records every `write` call.
    struct OneWritePerFrame {
        writes: usize,
        bytes: Vec<u8>,
    }

    impl Write for OneWritePerFrame {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frame_is_written_in_one_piece() {
        let mut writer = OneWritePerFrame {
            writes: 0,
            bytes: Vec::new(),
        };
        write_frame(
            &mut writer,
            &Response {
                id: 5,
                reply: Reply::Ok(json!("five")),
            },
        )
        .unwrap();

        assert_eq!(writer.writes, 1);
        assert!(writer.bytes.starts_with(FRAME_MARKER.as_bytes()));
        assert!(writer.bytes.ends_with(b"\n"));
    }

    #[test]
    fn test_reply_wire_shape() {
        let value = serde_json::to_value(Reply::Transfer("bad item".into())).unwrap();
        assert_eq!(value, json!({"status": "transfer", "body": "bad item"}));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let input = format!("{}{{not json\n", FRAME_MARKER);
        let result: Result<Option<Request>> = read_frame(&mut Cursor::new(input.into_bytes()));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
