//! Protocol constants and configuration values

/// Default Asterisk Manager Interface TCP port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// AGI status code for a successful command
pub const AGI_SUCCESS: u16 = 200;

/// AGI status code carried by the broken-channel sentinel
pub const AGI_BROKEN_CODE: u16 = 500;

/// Consecutive blank lines tolerated before the command channel is declared broken
pub const MAX_BLANK_READS: usize = 5;

/// Prefix carried by every AGI session-start header line
pub const AGI_HEADER_PREFIX: &str = "agi_";

/// Prefix of positional AGI script arguments (`agi_arg_1`, `agi_arg_2`, ...)
pub const AGI_ARGUMENT_PREFIX: &str = "arg_";

/// Manager frame terminator (blank line)
pub const FRAME_TERMINATOR: &str = "\r\n\r\n";

/// Manager line terminator
pub const LINE_TERMINATOR: &str = "\r\n";

/// Marker closing the output of a `Response: Follows` frame
pub const END_COMMAND_SENTINEL: &str = "--END COMMAND--";

/// Socket buffer size for reading from TCP stream (4KB) - manager frames are small
pub const SOCKET_BUF_SIZE: usize = 4096;

/// Initial allocation for the frame buffer
pub const BUF_CHUNK: usize = 16 * 1024;

/// Maximum total buffer size (8MB) - a frame this large means the peer never terminated it
pub const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// `Response` header values
pub const RESPONSE_SUCCESS: &str = "Success";
pub const RESPONSE_FOLLOWS: &str = "Follows";

/// `EventList` header values
pub const EVENT_LIST_START: &str = "start";
pub const EVENT_LIST_COMPLETE: &str = "Complete";
pub const EVENT_LIST_CANCELLED: &str = "Cancelled";

/// TCP connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
