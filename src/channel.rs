//! AGI command channel: one command line out, one reply in.

use crate::{
    action::validate_no_newlines,
    command::{format_exec, AgiResponse},
    constants::MAX_BLANK_READS,
    error::AsteriskResult,
    request::{parse_request, Request},
};
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tracing::{debug, trace, warn};

/// Command-channel settings.
///
/// Unknown keys are rejected when loading from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgiOptions {
    /// Separator placed between application arguments by
    /// [`AgiChannel::exec`]. Asterisk 1.6+ uses `,`; older releases use `|`.
    pub option_delimiter: char,
}

impl Default for AgiOptions {
    fn default() -> Self {
        Self {
            option_delimiter: ',',
        }
    }
}

impl AgiOptions {
    /// Load from a JSON document, e.g. `{"option_delimiter": "|"}`.
    pub fn from_json(json: &str) -> AsteriskResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Callback invoked with `(command, result)` when a reply carries a negative
/// `result=` value.
pub type NegativeResultHook = Box<dyn FnMut(&str, i64) + Send>;

/// AGI command channel over an inbound line reader and an outbound writer.
///
/// The channel exclusively owns both halves; every operation takes `&mut self`
/// and awaits exactly one exchange.
///
/// ```no_run
/// use asterisk_agi_tokio::AgiChannel;
///
/// # async fn example() -> Result<(), asterisk_agi_tokio::AsteriskError> {
/// let mut agi = AgiChannel::stdio();
/// let request = agi.read_request().await?;
/// println!("call from {:?}", request.caller_id());
///
/// let reply = agi.execute("ANSWER").await;
/// if !reply.is_success() {
///     eprintln!("answer failed: {}", reply.data());
/// }
/// agi.exec("Playback", &["hello-world"]).await;
/// # Ok(())
/// # }
/// ```
pub struct AgiChannel<R, W> {
    reader: R,
    writer: W,
    options: AgiOptions,
    request: Option<Request>,
    negative_result_hook: Option<NegativeResultHook>,
}

impl<R, W> std::fmt::Debug for AgiChannel<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiChannel")
            .field("options", &self.options)
            .field("request", &self.request)
            .field(
                "negative_result_hook",
                &self
                    .negative_result_hook
                    .is_some(),
            )
            .finish_non_exhaustive()
    }
}

impl AgiChannel<BufReader<Stdin>, Stdout> {
    /// Channel over the process's standard input and output, the usual
    /// transport when Asterisk spawns the script.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> AgiChannel<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a channel with default options.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_options(reader, writer, AgiOptions::default())
    }

    /// Create a channel with explicit options.
    pub fn with_options(reader: R, writer: W, options: AgiOptions) -> Self {
        Self {
            reader,
            writer,
            options,
            request: None,
            negative_result_hook: None,
        }
    }

    /// Channel options.
    pub fn options(&self) -> &AgiOptions {
        &self.options
    }

    /// Session-start headers, once [`read_request`](Self::read_request) ran.
    pub fn request(&self) -> Option<&Request> {
        self.request
            .as_ref()
    }

    /// Replace the default `warn!` diagnostic for negative results.
    ///
    /// The hook only observes; the returned [`AgiResponse`] is never altered.
    pub fn set_negative_result_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&str, i64) + Send + 'static,
    {
        self.negative_result_hook = Some(Box::new(hook));
    }

    /// Read the `agi_*` header block up to the first blank line (or end of
    /// stream), parse it and keep the result on the channel.
    pub async fn read_request(&mut self) -> AsteriskResult<&Request> {
        let mut raw = String::new();
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await?;
            if n == 0 || line
                .trim()
                .is_empty()
            {
                break;
            }
            raw.push_str(&line);
        }
        trace!("[AGI] Request block: {} bytes", raw.len());

        let request = parse_request(&raw)?;
        debug!(
            "[AGI] Session start: request={:?} channel={:?}",
            request.request(),
            request.channel()
        );
        Ok(&*self
            .request
            .insert(request))
    }

    /// Send one command and read its reply.
    ///
    /// Never fails: a write error, a closed stream, an unparseable status line
    /// or too many consecutive blank lines yield [`AgiResponse::broken()`].
    /// So does a command with an embedded line break, which is not sent.
    pub async fn execute(&mut self, command: &str) -> AgiResponse {
        let command = command.trim();
        if let Err(e) = validate_no_newlines(command, "AGI command") {
            warn!("[AGI] Refusing {:?}: {}", command, e);
            return AgiResponse::broken();
        }
        debug!("[AGI] >> {}", command);

        if let Err(e) = self
            .write_command(command)
            .await
        {
            warn!("[AGI] Write failed for '{}': {}", command, e);
            return AgiResponse::broken();
        }

        let Some(response) = self
            .read_reply()
            .await
        else {
            return AgiResponse::broken();
        };
        debug!(
            "[AGI] << {} result={:?} data={:?}",
            response.status_code(),
            response.result(),
            response.data()
        );

        if let Some(result) = response
            .result()
            .filter(|r| *r < 0)
        {
            match self
                .negative_result_hook
                .as_mut()
            {
                Some(hook) => hook(command, result),
                None => warn!("[AGI] {} returned {}", command, result),
            }
        }

        response
    }

    /// Run a dialplan application via `EXEC`, joining `args` with the
    /// configured option delimiter.
    pub async fn exec<S: AsRef<str>>(&mut self, application: &str, args: &[S]) -> AgiResponse {
        let line = format_exec(application, args, self.options.option_delimiter);
        self.execute(&line)
            .await
    }

    /// Give back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    async fn write_command(&mut self, command: &str) -> std::io::Result<()> {
        let line = format!("{}\n", command);
        self.writer
            .write_all(line.as_bytes())
            .await?;
        self.writer
            .flush()
            .await
    }

    /// One raw line including its terminator; `None` on end of stream or
    /// read error.
    async fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self
            .reader
            .read_line(&mut line)
            .await
        {
            Ok(0) => {
                warn!("[AGI] Stream closed while waiting for reply");
                None
            }
            Ok(_) => Some(line),
            Err(e) => {
                warn!("[AGI] Read failed: {}", e);
                None
            }
        }
    }

    async fn read_reply(&mut self) -> Option<AgiResponse> {
        // Stray blank lines can be left over from a previous reply (SEND TEXT).
        let mut blank_reads = 0;
        let status_line = loop {
            let line = self
                .next_line()
                .await?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                break trimmed.to_string();
            }
            blank_reads += 1;
            if blank_reads > MAX_BLANK_READS {
                warn!("[AGI] {} consecutive blank lines, channel broken", blank_reads);
                return None;
            }
        };

        let Some(code) = status_line.get(..3) else {
            warn!("[AGI] Short status line: {:?}", status_line);
            return None;
        };
        let Ok(status_code) = code.parse::<u16>() else {
            warn!("[AGI] Unparseable status line: {:?}", status_line);
            return None;
        };
        let rest = status_line[code.len()..].trim();

        let payload = match rest.strip_prefix('-') {
            Some(first) => {
                let mut body = format!("{}\n", first);
                let mut blank_lines = 0;
                loop {
                    let line = self
                        .next_line()
                        .await?;
                    if line.get(..3) == Some(code) {
                        break;
                    }
                    if line
                        .trim()
                        .is_empty()
                    {
                        blank_lines += 1;
                        if blank_lines >= MAX_BLANK_READS {
                            warn!("[AGI] Multiline reply never terminated, channel broken");
                            return None;
                        }
                    } else {
                        blank_lines = 0;
                    }
                    body.push_str(&line);
                }
                trace!("[AGI] Multiline reply: {} bytes", body.len());
                body
            }
            None => rest.to_string(),
        };

        Some(AgiResponse::from_reply(status_code, &payload))
    }
}
