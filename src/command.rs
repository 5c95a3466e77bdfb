//! Command-channel reply record and payload tokenizer

use crate::constants::{AGI_BROKEN_CODE, AGI_SUCCESS};
use std::collections::HashMap;

/// Reply to a single AGI command.
///
/// Created fresh per [`AgiChannel::execute`](crate::AgiChannel::execute) call.
/// Transport trouble produces [`AgiResponse::broken()`] instead of an error, so
/// callers always get a well-formed record back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiResponse {
    status_code: u16,
    result: Option<i64>,
    data: String,
    extensions: HashMap<String, String>,
}

impl AgiResponse {
    /// Build a reply record directly.
    pub fn new(status_code: u16, result: Option<i64>, data: impl Into<String>) -> Self {
        Self {
            status_code,
            result,
            data: data.into(),
            extensions: HashMap::new(),
        }
    }

    /// Sentinel returned when the channel is unusable: `{500, -1, ""}`.
    pub fn broken() -> Self {
        Self::new(AGI_BROKEN_CODE, Some(-1), "")
    }

    /// Build a record from a status code and the reply payload.
    ///
    /// Non-200 payloads land verbatim in `data`. A 200 payload is split on
    /// single spaces and fed through [`tokenize_success_payload`].
    pub fn from_reply(status_code: u16, payload: &str) -> Self {
        if status_code != AGI_SUCCESS {
            return Self::new(status_code, None, payload);
        }
        let mut response = Self::new(status_code, None, "");
        tokenize_success_payload(payload, &mut response);
        response
    }

    /// Three-digit status code (200 on success).
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Parsed `result=` value, if the reply carried one.
    pub fn result(&self) -> Option<i64> {
        self.result
    }

    /// Free-form reply text.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// `key=value` tokens other than `result`, e.g. `endpos=1234`.
    pub fn extensions(&self) -> &HashMap<String, String> {
        &self.extensions
    }

    /// Single extension value by key.
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .get(key)
            .map(String::as_str)
    }

    /// `true` for status code 200.
    pub fn is_success(&self) -> bool {
        self.status_code == AGI_SUCCESS
    }

    /// `true` if this is the broken-channel sentinel.
    pub fn is_broken(&self) -> bool {
        self.status_code == AGI_BROKEN_CODE && self.result == Some(-1) && self.data.is_empty()
    }
}

fn strip_brackets(token: &str) -> &str {
    token.trim_matches(['(', ')', ' '])
}

fn append_data(data: &mut String, piece: &str) {
    data.push(' ');
    data.push_str(piece);
}

/// Tokenize a 200 reply payload into `result`, extensions and `data`.
///
/// Rules, applied per space-separated token:
/// - inside a bracketed continuation, the token is stripped of `()` and
///   appended to `data`; a trailing `)` closes the continuation
/// - a token starting with `(` is appended the same way and opens a
///   continuation unless it already ends with `)`
/// - a token with `=` past its first character splits once on `=`; `result`
///   goes to the result value, every other key to the extensions
/// - any other non-empty token is appended to `data`
///
/// `data` is trimmed at the end.
pub fn tokenize_success_payload(payload: &str, response: &mut AgiResponse) {
    let mut data = String::new();
    let mut in_token = false;

    for token in payload
        .trim()
        .split(' ')
    {
        if in_token {
            append_data(&mut data, strip_brackets(token));
            if token.ends_with(')') {
                in_token = false;
            }
        } else if token.starts_with('(') {
            if !token.ends_with(')') {
                in_token = true;
            }
            append_data(&mut data, strip_brackets(token));
        } else if let Some((key, value)) = token
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
        {
            if key == "result" {
                match value.parse::<i64>() {
                    Ok(result) => response.result = Some(result),
                    Err(_) => {
                        response
                            .extensions
                            .insert(key.to_string(), value.to_string());
                    }
                }
            } else {
                response
                    .extensions
                    .insert(key.to_string(), value.to_string());
            }
        } else if !token.is_empty() {
            append_data(&mut data, token);
        }
    }

    response.data = data
        .trim()
        .to_string();
}

/// Format an `EXEC` command line, joining the application arguments with
/// `delimiter`.
///
/// ```
/// use asterisk_agi_tokio::format_exec;
///
/// assert_eq!(format_exec("Dial", &["SIP/100", "30"], ','), "EXEC Dial SIP/100,30");
/// assert_eq!(format_exec::<&str>("Answer", &[], ','), "EXEC Answer");
/// ```
pub fn format_exec<S: AsRef<str>>(application: &str, args: &[S], delimiter: char) -> String {
    let mut line = format!("EXEC {}", application);
    for (i, arg) in args
        .iter()
        .enumerate()
    {
        line.push(if i == 0 { ' ' } else { delimiter });
        line.push_str(arg.as_ref());
    }
    line
}
