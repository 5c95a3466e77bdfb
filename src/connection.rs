//! Manager session: connect, login, correlated requests, event routing

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    action::ManagerAction,
    constants::{
        DEFAULT_AMI_PORT, DEFAULT_TIMEOUT_MS, EVENT_LIST_CANCELLED, EVENT_LIST_COMPLETE,
        EVENT_LIST_START,
    },
    error::{AsteriskError, AsteriskResult},
    event::EventRegistry,
    headers::ManagerHeader,
    protocol::{FrameReader, ManagerFrame},
};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No stream, or torn down after logoff or a failed login
    Disconnected,
    /// Stream open, login not yet accepted
    Connecting,
    /// Login accepted
    LoggedIn,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::LoggedIn => write!(f, "logged in"),
        }
    }
}

/// Manager connection settings.
///
/// Every field has a default; unknown keys are rejected when loading from
/// JSON. `Debug` output masks the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerOptions {
    /// Host name or address. Default: `localhost`.
    pub server: String,
    /// TCP port. Default: 5038.
    pub port: u16,
    /// Login user name.
    pub username: String,
    /// Login secret.
    pub secret: String,
    /// TCP connect timeout. Default: 2000 ms.
    pub connect_timeout_ms: u64,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: DEFAULT_AMI_PORT,
            username: String::new(),
            secret: String::new(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl std::fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl ManagerOptions {
    /// Options for `server` on the default port.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout_ms(mut self, connect_timeout_ms: u64) -> Self {
        self.connect_timeout_ms = connect_timeout_ms;
        self
    }

    /// Load from a JSON document.
    pub fn from_json(json: &str) -> AsteriskResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(
    host: &str,
    port: u16,
    timeout_ms: u64,
) -> AsteriskResult<TcpStream> {
    let tcp_result = timeout(
        Duration::from_millis(timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await;

    match tcp_result {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(AsteriskError::Io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(AsteriskError::Timeout { timeout_ms })
        }
    }
}

/// Asterisk Manager Interface session over a single owned stream.
///
/// Requests and event delivery share the stream: while waiting for the
/// response to an action, every event frame read is handed to the registered
/// handlers before the wait continues. Nothing runs in the background.
///
/// ```rust,no_run
/// use asterisk_agi_tokio::{ManagerOptions, ManagerSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), asterisk_agi_tokio::AsteriskError> {
///     let options = ManagerOptions::new("127.0.0.1", "admin", "amp111");
///     let mut ami = ManagerSession::new(options);
///
///     ami.register_event_handler("Hangup", |name, frame, _server, _port| {
///         println!("{}: {:?}", name, frame.header("Channel"));
///     });
///     ami.connect().await?;
///
///     let reply = ami.send_action("Command", &[("Command", "core show uptime")]).await?;
///     println!("{}", reply.data().unwrap_or(""));
///
///     ami.disconnect().await
/// }
/// ```
pub struct ManagerSession<S = TcpStream> {
    options: ManagerOptions,
    stream: Option<S>,
    reader: FrameReader,
    state: SessionState,
    banner: Option<String>,
    handlers: EventRegistry,
    action_seq: u64,
    pending_list: Option<(String, Vec<ManagerFrame>)>,
}

impl<S> std::fmt::Debug for ManagerSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerSession")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("banner", &self.banner)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl ManagerSession<TcpStream> {
    /// Unconnected TCP session.
    pub fn new(options: ManagerOptions) -> Self {
        Self::detached(options)
    }

    /// Open a TCP connection to the configured server, read the banner and
    /// log in.
    pub async fn connect(&mut self) -> AsteriskResult<()> {
        info!(
            "[AMI] Connecting to {}:{}",
            self.options.server, self.options.port
        );
        if self
            .stream
            .is_some()
        {
            self.teardown()
                .await;
        }
        self.state = SessionState::Connecting;
        let stream = match tcp_connect_with_timeout(
            &self.options.server,
            self.options.port,
            self.options.connect_timeout_ms,
        )
        .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };
        self.connect_with(stream)
            .await
    }
}

impl<S> ManagerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Session over a caller-provided stream type, not yet connected.
    pub fn detached(options: ManagerOptions) -> Self {
        Self {
            options,
            stream: None,
            reader: FrameReader::new(),
            state: SessionState::Disconnected,
            banner: None,
            handlers: EventRegistry::new(),
            action_seq: 0,
            pending_list: None,
        }
    }

    /// Take ownership of an already-open stream, read the banner and log in.
    pub async fn connect_with(&mut self, stream: S) -> AsteriskResult<()> {
        if self
            .stream
            .is_some()
        {
            self.teardown()
                .await;
        }
        self.stream = Some(stream);
        self.reader = FrameReader::new();
        self.state = SessionState::Connecting;

        let banner = match self
            .read_banner()
            .await
        {
            Ok(banner) => banner,
            Err(e) => {
                warn!("[AMI] No banner from {}: {}", self.options.server, e);
                self.teardown()
                    .await;
                return Err(e);
            }
        };
        debug!("[AMI] Banner: {}", banner);
        self.banner = Some(banner);

        self.login()
            .await?;
        info!(
            "[AMI] Logged in to {}:{} as {}",
            self.options.server, self.options.port, self.options.username
        );
        Ok(())
    }

    async fn read_banner(&mut self) -> AsteriskResult<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(AsteriskError::NotConnected)?;
        self.reader
            .read_line(stream)
            .await
    }

    /// Send `Login` with the configured credentials. A rejected login tears
    /// the session down.
    pub async fn login(&mut self) -> AsteriskResult<ManagerFrame> {
        let action = ManagerAction::new("Login")
            .param(ManagerHeader::Username.as_str(), self.options.username.as_str())
            .param(ManagerHeader::Secret.as_str(), self.options.secret.as_str());

        let response = match self
            .send_request(action)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.teardown()
                    .await;
                return Err(e);
            }
        };

        if !response.is_success() {
            let reason = response
                .message()
                .unwrap_or("Login failed")
                .to_string();
            warn!("[AMI] Login rejected: {}", reason);
            self.teardown()
                .await;
            return Err(AsteriskError::auth_failed(reason));
        }

        self.state = SessionState::LoggedIn;
        debug!("[AMI] Authentication accepted");
        Ok(response)
    }

    /// Send an action and wait for its correlated response.
    ///
    /// An `ActionID` parameter is appended unless the action already carries
    /// one. Event-list responses come back aggregated; see
    /// [`wait_response`](Self::wait_response).
    pub async fn send_request(&mut self, action: ManagerAction) -> AsteriskResult<ManagerFrame> {
        let mut action = action;
        self.action_seq += 1;
        let action_id = action.ensure_action_id(self.action_seq);
        let wire = action.to_wire_format()?;

        let stream = self
            .stream
            .as_mut()
            .ok_or(AsteriskError::NotConnected)?;
        debug!("[AMI] >> {}", action.redacted());
        stream
            .write_all(wire.as_bytes())
            .await?;
        stream
            .flush()
            .await?;

        self.wait_response(Some(action_id.as_str()))
            .await
    }

    /// Convenience wrapper over [`send_request`](Self::send_request) for
    /// single-valued parameters.
    pub async fn send_action(
        &mut self,
        name: &str,
        params: &[(&str, &str)],
    ) -> AsteriskResult<ManagerFrame> {
        let action = params
            .iter()
            .fold(ManagerAction::new(name), |action, (key, value)| {
                action.param(*key, *value)
            });
        self.send_request(action)
            .await
    }

    /// Read frames until the response for `action_id` arrives.
    ///
    /// With `None`, exactly one frame of any type is returned. Event frames
    /// read along the way are dispatched to the registered handlers.
    ///
    /// If the matched response opens an event list (`EventList: start`), the
    /// following frames with the same action ID are collected until one
    /// carrying `EventList: Complete` (or `Cancelled`). That terminal frame is
    /// returned with the collected frames in [`ManagerFrame::events`].
    ///
    /// A list left unfinished by an earlier interrupted wait for the same
    /// action ID is resumed rather than started over.
    ///
    /// There is no timeout here; a response that never arrives blocks
    /// forever. Use [`wait_response_timeout`](Self::wait_response_timeout)
    /// for a bounded wait.
    pub async fn wait_response(&mut self, action_id: Option<&str>) -> AsteriskResult<ManagerFrame> {
        let Some(action_id) = action_id else {
            return self
                .next_frame()
                .await;
        };

        match self
            .pending_list
            .take()
        {
            Some((pending, events)) if pending == action_id => {
                trace!("[AMI] Resuming event list for {}", action_id);
                self.pending_list = Some((pending, events));
            }
            abandoned => {
                if let Some((pending, events)) = abandoned {
                    debug!(
                        "[AMI] Dropping unfinished event list {} ({} frames)",
                        pending,
                        events.len()
                    );
                }
                let response = self
                    .next_matching(action_id)
                    .await?;
                let opens_list = response
                    .event_list()
                    .is_some_and(|v| v.eq_ignore_ascii_case(EVENT_LIST_START));
                if !opens_list {
                    return Ok(response);
                }
                trace!("[AMI] Collecting event list for {}", action_id);
                self.pending_list = Some((action_id.to_string(), Vec::new()));
            }
        }

        // Frames collected so far live on the session so an expired
        // deadline does not lose them.
        loop {
            let mut frame = self
                .next_matching(action_id)
                .await?;
            let terminal = frame
                .event_list()
                .is_some_and(|v| {
                    v.eq_ignore_ascii_case(EVENT_LIST_COMPLETE)
                        || v.eq_ignore_ascii_case(EVENT_LIST_CANCELLED)
                });
            if terminal {
                let events = self
                    .pending_list
                    .take()
                    .map(|(_, events)| events)
                    .unwrap_or_default();
                debug!(
                    "[AMI] Event list {} closed with {} frames",
                    action_id,
                    events.len()
                );
                frame.set_events(events);
                return Ok(frame);
            }
            if let Some((_, events)) = self
                .pending_list
                .as_mut()
            {
                events.push(frame);
            }
        }
    }

    /// [`wait_response`](Self::wait_response) bounded by `deadline`.
    ///
    /// Expiry yields [`AsteriskError::Timeout`]. Bytes already read stay
    /// buffered, and an event list interrupted part way keeps its collected
    /// frames, so a later wait for the same action ID picks up where this one
    /// stopped. Waiting for a different action ID drops the unfinished list.
    pub async fn wait_response_timeout(
        &mut self,
        action_id: Option<&str>,
        deadline: Duration,
    ) -> AsteriskResult<ManagerFrame> {
        match timeout(deadline, self.wait_response(action_id)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = deadline.as_millis() as u64;
                warn!("[AMI] No response after {}ms", timeout_ms);
                Err(AsteriskError::Timeout { timeout_ms })
            }
        }
    }

    async fn next_frame(&mut self) -> AsteriskResult<ManagerFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(AsteriskError::NotConnected)?;
        let frame = self
            .reader
            .read_frame(stream)
            .await?;
        trace!("[AMI] << {} frame", frame.frame_type());

        if frame.is_event() {
            self.handlers
                .dispatch(&frame, &self.options.server, self.options.port);
        }
        Ok(frame)
    }

    async fn next_matching(&mut self, action_id: &str) -> AsteriskResult<ManagerFrame> {
        loop {
            let frame = self
                .next_frame()
                .await?;
            if frame.action_id() == Some(action_id) {
                return Ok(frame);
            }
        }
    }

    /// Register an event handler. Returns `false` if the (case-insensitive)
    /// name already has one.
    pub fn register_event_handler<F>(&mut self, event: &str, handler: F) -> bool
    where
        F: FnMut(&str, &ManagerFrame, &str, u16) + Send + 'static,
    {
        self.handlers
            .register(event, handler)
    }

    /// Remove an event handler. Returns whether one was removed.
    pub fn unregister_event_handler(&mut self, event: &str) -> bool {
        self.handlers
            .unregister(event)
    }

    /// Log off if logged in, then close the stream.
    ///
    /// Logoff failures are logged and ignored.
    pub async fn disconnect(&mut self) -> AsteriskResult<()> {
        if self.state == SessionState::LoggedIn {
            match self
                .send_request(ManagerAction::new("Logoff"))
                .await
            {
                Ok(frame) => debug!("[AMI] Logoff: {:?}", frame.response()),
                Err(e) => debug!("[AMI] Logoff failed: {}", e),
            }
        }
        self.teardown()
            .await;
        info!("[AMI] Disconnected from {}", self.options.server);
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut stream) = self
            .stream
            .take()
        {
            if let Err(e) = stream
                .shutdown()
                .await
            {
                debug!("[AMI] Shutdown error: {}", e);
            }
        }
        self.reader = FrameReader::new();
        self.pending_list = None;
        self.state = SessionState::Disconnected;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `true` once login was accepted and until disconnect.
    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    /// Protocol banner received on connect, e.g. `Asterisk Call Manager/5.0.1`.
    pub fn banner(&self) -> Option<&str> {
        self.banner
            .as_deref()
    }

    /// Session options.
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }
}
