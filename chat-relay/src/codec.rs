use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ReadError};

/// Largest frame accepted by default, matching a single 4 KiB socket read.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Reply sent after a successful `register`.
pub const ACK: &str = "ack";

const FRAME_DELIMITER: u8 = b'\n';
const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A decoded client request.
///
/// Frames are `<command>:<argument>` split on the first colon only, so the
/// argument may itself contain colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { name: String },
    /// The argument of `list` is ignored.
    List,
    Chat { target: String },
    Unknown { command: String },
}

impl Command {
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let (command, argument) = frame
            .split_once(':')
            .ok_or(ProtocolError::MalformedMessage)?;

        let parsed = match command {
            "register" => Command::Register {
                name: argument.to_string(),
            },
            "list" => Command::List,
            "chat" => Command::Chat {
                target: argument.to_string(),
            },
            other => Command::Unknown {
                command: other.to_string(),
            },
        };
        Ok(parsed)
    }

    /// Encodes the command as a frame body (without delimiter).
    pub fn encode(&self) -> String {
        match self {
            Command::Register { name } => format!("register:{name}"),
            Command::List => "list:".to_string(),
            Command::Chat { target } => format!("chat:{target}"),
            Command::Unknown { command } => format!("{command}:"),
        }
    }
}

/// Comma-joined list of names with no trailing delimiter.
pub fn encode_roster<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`encode_roster`]; an empty frame means nobody is online.
pub fn decode_roster(frame: &str) -> Vec<String> {
    if frame.is_empty() {
        return Vec::new();
    }
    frame.split(',').map(str::to_string).collect()
}

/// The relayed greeting delivered to a chat recipient.
pub fn encode_greeting(from: &str) -> String {
    format!("{from} says hi")
}

/// Reads the next newline-delimited frame.
///
/// Returns `Ok(None)` on EOF. A trailing `\r` is stripped and blank frames
/// come back as empty strings, since an empty roster is a valid reply.
/// Frames longer than `max_len` bytes fail with
/// [`ProtocolError::FrameTooLong`]; the rest of that line is not consumed, so
/// callers should drop the connection.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<String>, ReadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let bytes = (&mut *reader)
        .take(limit)
        .read_until(FRAME_DELIMITER, &mut buf)
        .await?;
    if bytes == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&FRAME_DELIMITER) && buf.len() > max_len {
        return Err(ProtocolError::FrameTooLong { limit: max_len }.into());
    }

    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(LINE_ENDINGS).to_string()))
}

pub async fn write_frame<W>(writer: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // One write per frame so the delimiter never gets separated from its body.
    let mut encoded = Vec::with_capacity(frame.len() + 1);
    encoded.extend_from_slice(frame.as_bytes());
    encoded.push(FRAME_DELIMITER);
    writer.write_all(&encoded).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn parse_splits_on_first_colon_only() {
        assert_eq!(
            Command::parse("chat:bob:with:colons"),
            Ok(Command::Chat {
                target: "bob:with:colons".into()
            })
        );
    }

    #[test]
    fn parse_known_commands() {
        assert_eq!(
            Command::parse("register:alice"),
            Ok(Command::Register {
                name: "alice".into()
            })
        );
        assert_eq!(Command::parse("list:friends"), Ok(Command::List));
        assert_eq!(Command::parse("list:"), Ok(Command::List));
    }

    #[test]
    fn parse_allows_empty_argument() {
        assert_eq!(
            Command::parse("chat:"),
            Ok(Command::Chat { target: "".into() })
        );
    }

    #[test]
    fn parse_without_colon_is_malformed() {
        assert_eq!(
            Command::parse("register alice"),
            Err(ProtocolError::MalformedMessage)
        );
        assert_eq!(Command::parse(""), Err(ProtocolError::MalformedMessage));
    }

    #[test]
    fn unknown_commands_still_parse() {
        assert_eq!(
            Command::parse("whois:bob"),
            Ok(Command::Unknown {
                command: "whois".into()
            })
        );
        // Command words are case-sensitive.
        assert!(matches!(
            Command::parse("LIST:"),
            Ok(Command::Unknown { .. })
        ));
    }

    #[test]
    fn roster_has_no_trailing_delimiter() {
        assert_eq!(encode_roster(&["a", "b", "c"]), "a,b,c");
        assert_eq!(encode_roster::<&str>(&[]), "");
        assert_eq!(decode_roster(""), Vec::<String>::new());
        assert_eq!(decode_roster("a,b"), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn read_frame_handles_crlf_and_blank_lines() {
        let input: &[u8] = b"\r\nregister:alice\r\nlist:x\n";
        let mut reader = BufReader::new(input);

        let blank = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("blank frame");
        assert_eq!(blank.as_deref(), Some(""));

        let first = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("first frame");
        assert_eq!(first.as_deref(), Some("register:alice"));

        let second = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("second frame");
        assert_eq!(second.as_deref(), Some("list:x"));

        let eof = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("eof");
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn read_frame_accepts_final_frame_without_delimiter() {
        let input: &[u8] = b"chat:bob";
        let mut reader = BufReader::new(input);
        let frame = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("frame");
        assert_eq!(frame.as_deref(), Some("chat:bob"));
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_frames() {
        let input: &[u8] = b"register:abcdefghij\n";
        let mut reader = BufReader::new(input);
        let result = read_frame(&mut reader, 8).await;
        assert!(matches!(
            result,
            Err(ReadError::Protocol(ProtocolError::FrameTooLong { limit: 8 }))
        ));
    }

    #[tokio::test]
    async fn frames_written_are_newline_delimited() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        write_frame(&mut writer, &encode_greeting("alice"))
            .await
            .expect("write frame");
        write_frame(&mut writer, ACK).await.expect("write ack");

        let greeting = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("read greeting");
        assert_eq!(greeting.as_deref(), Some("alice says hi"));
        let ack = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("read ack");
        assert_eq!(ack.as_deref(), Some(ACK));
    }
}
