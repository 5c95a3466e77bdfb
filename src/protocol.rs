//! Manager protocol framing and frame parsing

use crate::{
    buffer::FrameBuffer,
    constants::{
        END_COMMAND_SENTINEL, FRAME_TERMINATOR, LINE_TERMINATOR, RESPONSE_FOLLOWS,
        RESPONSE_SUCCESS, SOCKET_BUF_SIZE,
    },
    error::{AsteriskError, AsteriskResult},
    headers::ManagerHeader,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Frame kind, taken from the name of the first header line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// First header is `Event`
    Event,
    /// First header is `Response`
    Response,
    /// Empty frame (bare blank line)
    Empty,
    /// Anything else, lower-cased
    Unknown(String),
}

impl FrameType {
    /// Classify by first header name, case-insensitively.
    pub fn from_header_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "event" => FrameType::Event,
            "response" => FrameType::Response,
            "" => FrameType::Empty,
            _ => FrameType::Unknown(name),
        }
    }

    /// Lower-case type name; empty for [`FrameType::Empty`].
    pub fn as_str(&self) -> &str {
        match self {
            FrameType::Event => "event",
            FrameType::Response => "response",
            FrameType::Empty => "",
            FrameType::Unknown(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manager frame: ordered `key: value` headers, optional command output
/// and, for event-list responses, the collected intermediate frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerFrame {
    frame_type: FrameType,
    headers: Vec<(String, String)>,
    data: Option<String>,
    events: Vec<ManagerFrame>,
}

fn split_header(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (line.trim(), ""),
    }
}

/// Command output preceding the sentinel, minus the single separator
/// character in front of it.
fn command_output(line: &str) -> Option<String> {
    let before = &line[..line.find(END_COMMAND_SENTINEL)?];
    let end = before
        .char_indices()
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    Some(before[..end].to_string())
}

impl ManagerFrame {
    /// Build a frame from already-split headers.
    pub fn new(frame_type: FrameType, headers: Vec<(String, String)>) -> Self {
        Self {
            frame_type,
            headers,
            data: None,
            events: Vec::new(),
        }
    }

    /// Parse a frame body (everything before the `\r\n\r\n` terminator).
    ///
    /// A `Follows` response loses its last line, whose text before
    /// `--END COMMAND--` becomes [`data()`](Self::data).
    pub fn parse(body: &str) -> Self {
        let mut lines: Vec<&str> = body
            .split(LINE_TERMINATOR)
            .collect();

        let (first_name, first_value) = lines
            .first()
            .copied()
            .map(split_header)
            .unwrap_or(("", ""));
        let frame_type = FrameType::from_header_name(first_name);

        let mut data = None;
        if first_value == RESPONSE_FOLLOWS && lines.len() > 1 {
            if let Some(last) = lines.pop() {
                data = command_output(last);
            }
        }

        let headers = lines
            .into_iter()
            .filter(|line| {
                !line
                    .trim()
                    .is_empty()
            })
            .map(|line| {
                let (key, value) = split_header(line);
                (key.to_string(), value.to_string())
            })
            .collect();

        Self {
            frame_type,
            headers,
            data,
            events: Vec::new(),
        }
    }

    /// Frame kind.
    pub fn frame_type(&self) -> &FrameType {
        &self.frame_type
    }

    /// `true` for event frames.
    pub fn is_event(&self) -> bool {
        self.frame_type == FrameType::Event
    }

    /// `true` for response frames.
    pub fn is_response(&self) -> bool {
        self.frame_type == FrameType::Response
    }

    /// All headers in arrival order, duplicates included.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Header value by exact (case-sensitive) name. When a name repeats, the
    /// last occurrence wins.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Every value of a repeated header, in arrival order.
    pub fn header_values(&self, name: impl AsRef<str>) -> Vec<&str> {
        let name = name.as_ref();
        self.headers
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Command output of a `Follows` response.
    pub fn data(&self) -> Option<&str> {
        self.data
            .as_deref()
    }

    /// Intermediate frames of an event-list response, in arrival order.
    pub fn events(&self) -> &[ManagerFrame] {
        &self.events
    }

    pub(crate) fn set_events(&mut self, events: Vec<ManagerFrame>) {
        self.events = events;
    }

    /// `ActionID` header.
    pub fn action_id(&self) -> Option<&str> {
        self.header(ManagerHeader::ActionId)
    }

    // Frame type is classified without regard to case, so the headers that
    // decide it are looked up the same way.
    fn type_header(&self, name: ManagerHeader) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.as_str()))
            .map(|(_, value)| value.as_str())
    }

    /// `Event` header, matched case-insensitively.
    pub fn event_name(&self) -> Option<&str> {
        self.type_header(ManagerHeader::Event)
    }

    /// `Response` header, matched case-insensitively.
    pub fn response(&self) -> Option<&str> {
        self.type_header(ManagerHeader::Response)
    }

    /// `EventList` header.
    pub fn event_list(&self) -> Option<&str> {
        self.header(ManagerHeader::EventList)
    }

    /// `Message` header.
    pub fn message(&self) -> Option<&str> {
        self.header(ManagerHeader::Message)
    }

    /// `true` if `Response: Success`.
    pub fn is_success(&self) -> bool {
        self.response() == Some(RESPONSE_SUCCESS)
    }
}

/// Incremental reader splitting a byte stream into manager frames.
///
/// Bytes read past a frame terminator are kept for the next call, so the same
/// reader must be used for the whole life of a stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: FrameBuffer,
}

impl FrameReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes.
    pub fn add_data(&mut self, data: &[u8]) -> AsteriskResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()?;
        Ok(())
    }

    /// Bytes waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Split one complete frame off the buffer, if present.
    pub fn parse_frame(&mut self) -> AsteriskResult<Option<ManagerFrame>> {
        let Some(body) = self
            .buffer
            .extract_until_pattern(FRAME_TERMINATOR.as_bytes())
        else {
            return Ok(None);
        };
        let body = String::from_utf8(body)
            .map_err(|_| AsteriskError::protocol_error("Invalid UTF-8 in frame"))?;
        let frame = ManagerFrame::parse(&body);
        trace!(
            "[AMI] Parsed {} frame with {} headers",
            frame.frame_type(),
            frame
                .headers()
                .len()
        );
        Ok(Some(frame))
    }

    /// Split one `\n`-terminated line off the buffer, trimmed.
    pub fn parse_line(&mut self) -> AsteriskResult<Option<String>> {
        let Some(line) = self
            .buffer
            .extract_until_pattern(b"\n")
        else {
            return Ok(None);
        };
        let line = String::from_utf8(line)
            .map_err(|_| AsteriskError::protocol_error("Invalid UTF-8 in line"))?;
        Ok(Some(
            line.trim()
                .to_string(),
        ))
    }

    /// Read from `stream` until a whole frame is buffered.
    ///
    /// No timeout: a silent peer blocks this forever. End of stream before a
    /// terminator is [`AsteriskError::ConnectionClosed`].
    pub async fn read_frame<S>(&mut self, stream: &mut S) -> AsteriskResult<ManagerFrame>
    where
        S: AsyncRead + Unpin,
    {
        let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(frame);
            }
            self.fill(stream, &mut read_buffer)
                .await?;
        }
    }

    /// Read from `stream` until a whole line is buffered.
    pub async fn read_line<S>(&mut self, stream: &mut S) -> AsteriskResult<String>
    where
        S: AsyncRead + Unpin,
    {
        let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
        loop {
            if let Some(line) = self.parse_line()? {
                return Ok(line);
            }
            self.fill(stream, &mut read_buffer)
                .await?;
        }
    }

    async fn fill<S>(&mut self, stream: &mut S, read_buffer: &mut [u8]) -> AsteriskResult<()>
    where
        S: AsyncRead + Unpin,
    {
        let bytes_read = stream
            .read(read_buffer)
            .await?;
        trace!("[AMI] Read {} bytes from stream", bytes_read);
        if bytes_read == 0 {
            return Err(AsteriskError::ConnectionClosed);
        }
        self.add_data(&read_buffer[..bytes_read])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_event_key_keeps_name() {
        let frame = ManagerFrame::parse("event: Hangup\r\nChannel: SIP/100-1");
        assert!(frame.is_event());
        assert_eq!(frame.event_name(), Some("Hangup"));
        assert_eq!(frame.header("Event"), None);
    }

    #[test]
    fn test_follows_frame_extracts_output() {
        let mut reader = FrameReader::new();
        reader
            .add_data(b"Response: Follows\r\nline1\r\nsome output --END COMMAND--\r\n\r\n")
            .unwrap();
        let frame = reader
            .parse_frame()
            .unwrap()
            .unwrap();

        assert_eq!(frame.frame_type(), &FrameType::Response);
        assert_eq!(frame.data(), Some("some output"));
        assert_eq!(frame.response(), Some("Follows"));
        assert!(frame
            .headers()
            .iter()
            .all(|(k, _)| !k.contains(END_COMMAND_SENTINEL)));
        assert_eq!(frame.header("line1"), Some(""));
    }

    #[test]
    fn test_follows_multiline_output() {
        let frame = ManagerFrame::parse(
            "Response: Follows\r\nPrivilege: Command\r\nActionID: 7\r\nName/username    Host\n100    (Unspecified)\n--END COMMAND--",
        );
        assert_eq!(frame.data(), Some("Name/username    Host\n100    (Unspecified)"));
        assert_eq!(frame.action_id(), Some("7"));
        assert_eq!(frame.header("Privilege"), Some("Command"));
    }

    #[test]
    fn test_follows_without_sentinel_drops_last_line() {
        let frame = ManagerFrame::parse("Response: Follows\r\nActionID: 1\r\nno marker");
        assert_eq!(frame.data(), None);
        assert_eq!(
            frame
                .headers()
                .len(),
            2
        );
    }

    #[test]
    fn test_event_frame() {
        let frame = ManagerFrame::parse(
            "Event: Newchannel\r\nPrivilege: call,all\r\nChannel: SIP/100-00000001\r\nUniqueid: 1450911661.12",
        );
        assert!(frame.is_event());
        assert_eq!(frame.event_name(), Some("Newchannel"));
        assert_eq!(frame.header("Uniqueid"), Some("1450911661.12"));
        assert_eq!(frame.header("uniqueid"), None);
        assert_eq!(frame.data(), None);
    }

    #[test]
    fn test_value_split_on_first_colon() {
        let frame = ManagerFrame::parse("Event: VarSet\r\nValue: sip:100@10.0.0.1:5060");
        assert_eq!(frame.header("Value"), Some("sip:100@10.0.0.1:5060"));
    }

    #[test]
    fn test_duplicate_header_last_wins() {
        let frame = ManagerFrame::parse("Event: X\r\nVariable: a=1\r\nVariable: b=2");
        assert_eq!(frame.header("Variable"), Some("b=2"));
        assert_eq!(frame.header_values("Variable"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_frame_types() {
        assert_eq!(ManagerFrame::parse("").frame_type(), &FrameType::Empty);
        assert_eq!(
            ManagerFrame::parse("RESPONSE: Success").frame_type(),
            &FrameType::Response
        );
        assert_eq!(
            ManagerFrame::parse("Ping: Pong").frame_type(),
            &FrameType::Unknown("ping".to_string())
        );
        assert_eq!(FrameType::Event.to_string(), "event");
    }

    #[test]
    fn test_success_and_message() {
        let frame = ManagerFrame::parse(
            "Response: Error\r\nActionID: 42\r\nMessage: Authentication failed",
        );
        assert!(!frame.is_success());
        assert_eq!(frame.message(), Some("Authentication failed"));
        assert!(ManagerFrame::parse("Response: Success").is_success());
    }

    #[test]
    fn test_partial_data_then_multiple_frames() {
        let mut reader = FrameReader::new();
        reader
            .add_data(b"Response: Success\r\nActionID: 1\r\n")
            .unwrap();
        assert!(reader
            .parse_frame()
            .unwrap()
            .is_none());

        reader
            .add_data(b"\r\nEvent: FullyBooted\r\n\r\nEvent: Hang")
            .unwrap();
        let first = reader
            .parse_frame()
            .unwrap()
            .unwrap();
        let second = reader
            .parse_frame()
            .unwrap()
            .unwrap();
        assert_eq!(first.action_id(), Some("1"));
        assert_eq!(second.event_name(), Some("FullyBooted"));
        assert!(reader
            .parse_frame()
            .unwrap()
            .is_none());
        assert_eq!(reader.buffered(), "Event: Hang".len());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut reader = FrameReader::new();
        reader
            .add_data(b"Event: \xff\xfe\r\n\r\n")
            .unwrap();
        assert!(matches!(
            reader.parse_frame(),
            Err(AsteriskError::ProtocolError { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_banner_then_frame() {
        let mut stream: &[u8] =
            b"Asterisk Call Manager/5.0.1\r\nResponse: Success\r\nMessage: Authentication accepted\r\n\r\n";
        let mut reader = FrameReader::new();

        let banner = reader
            .read_line(&mut stream)
            .await
            .unwrap();
        assert_eq!(banner, "Asterisk Call Manager/5.0.1");

        let frame = reader
            .read_frame(&mut stream)
            .await
            .unwrap();
        assert!(frame.is_success());
        assert_eq!(frame.message(), Some("Authentication accepted"));
    }

    #[tokio::test]
    async fn test_read_frame_eof() {
        let mut stream: &[u8] = b"Event: Partial\r\n";
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader
                .read_frame(&mut stream)
                .await,
            Err(AsteriskError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_over_duplex_in_pieces() {
        use tokio::io::AsyncWriteExt;

        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            for piece in [&b"Event: Hang"[..], b"up\r\nCause: 16\r", b"\n\r\n"] {
                server
                    .write_all(piece)
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut reader = FrameReader::new();
        let frame = reader
            .read_frame(&mut client)
            .await
            .unwrap();
        assert_eq!(frame.event_name(), Some("Hangup"));
        assert_eq!(frame.header("Cause"), Some("16"));
        writer
            .await
            .unwrap();
    }
}
