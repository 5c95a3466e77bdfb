//! Asterisk AGI command channel and Manager Interface (AMI) session engine
//!
//! Two independent protocol engines on tokio:
//!
//! - [`AgiChannel`]: the per-call AGI line protocol. Parses the `agi_*`
//!   session-start headers into a [`Request`], sends one command line and
//!   reads its `200 result=...` reply into an [`AgiResponse`]. Transport
//!   failures never surface as errors; they yield [`AgiResponse::broken()`].
//! - [`ManagerSession`]: the persistent AMI socket protocol. Logs in, sends
//!   [`ManagerAction`]s correlated by `ActionID`, aggregates event-list
//!   responses and routes interleaved events to handlers registered in an
//!   [`EventRegistry`].
//!
//! Both engines own their stream and run one exchange at a time; nothing is
//! spawned in the background.
//!
//! # Examples
//!
//! ## AGI script
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AgiChannel, AsteriskError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AsteriskError> {
//!     let mut agi = AgiChannel::stdio();
//!     let request = agi.read_request().await?;
//!     let caller = request.caller_id().unwrap_or("unknown").to_string();
//!
//!     agi.execute("ANSWER").await;
//!     let reply = agi.execute("GET DATA beep 3000 4").await;
//!     if reply.data() == "timeout" {
//!         agi.exec("Playback", &["vm-goodbye"]).await;
//!     }
//!     agi.execute(&format!("VERBOSE \"call from {}\" 1", caller)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Manager session
//!
//! ```rust,no_run
//! use asterisk_agi_tokio::{AsteriskError, ManagerAction, ManagerOptions, ManagerSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AsteriskError> {
//!     let options = ManagerOptions::new("127.0.0.1", "admin", "amp111");
//!     let mut ami = ManagerSession::new(options);
//!
//!     ami.register_event_handler("*", |name, _frame, server, _port| {
//!         println!("{} from {}", name, server);
//!     });
//!     ami.connect().await?;
//!
//!     let list = ami.send_request(ManagerAction::new("CoreShowChannels")).await?;
//!     for channel in list.events() {
//!         println!("{:?}", channel.header("Channel"));
//!     }
//!
//!     ami.disconnect().await
//! }
//! ```
//!
//! Loading options from JSON rejects unknown keys:
//!
//! ```rust
//! use asterisk_agi_tokio::ManagerOptions;
//!
//! let options = ManagerOptions::from_json(r#"{"server": "pbx", "port": 5039}"#).unwrap();
//! assert_eq!(options.port, 5039);
//! assert!(ManagerOptions::from_json(r#"{"hostname": "pbx"}"#).is_err());
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod channel;
pub mod command;
pub mod connection;
pub mod error;
pub mod event;
pub mod headers;
pub mod protocol;
pub mod request;

pub mod buffer;
pub mod constants;

pub use action::{ActionValue, ManagerAction};
pub use channel::{AgiChannel, AgiOptions, NegativeResultHook};
pub use command::{format_exec, tokenize_success_payload, AgiResponse};
pub use connection::{ManagerOptions, ManagerSession, SessionState};
pub use constants::DEFAULT_AMI_PORT;
pub use error::{AsteriskError, AsteriskResult};
pub use event::{EventHandler, EventRegistry, WILDCARD_EVENT};
pub use headers::{ManagerHeader, ParseManagerHeaderError};
pub use protocol::{FrameReader, FrameType, ManagerFrame};
pub use request::{parse_request, ParseRequestFieldError, Request, RequestField};
