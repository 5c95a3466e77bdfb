//! AGI session-start header parsing
//!
//! When Asterisk launches an AGI script it first writes a block of
//! `agi_<field>: <value>` lines terminated by a blank line:
//!
//! ```text
//! agi_request: hello.agi
//! agi_channel: SIP/provider-0000000c
//! agi_uniqueid: 1450911661.12
//! agi_arg_1: first
//! ```
//!
//! [`parse_request`] turns that block into an immutable [`Request`].

use crate::{
    constants::{AGI_ARGUMENT_PREFIX, AGI_HEADER_PREFIX},
    error::{AsteriskError, AsteriskResult},
};
use serde::Serialize;
use std::str::FromStr;

/// Error returned when parsing an unrecognized request field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequestFieldError(pub String);

impl std::fmt::Display for ParseRequestFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown request field: {}", self.0)
    }
}

impl std::error::Error for ParseRequestFieldError {}

define_header_enum! {
    error_type: ParseRequestFieldError,
    /// Named attributes of a [`Request`], keyed by their attribute name.
    ///
    /// Header names on the wire are lowercase (`agi_uniqueid`); the parser maps
    /// them onto these names through a fixed alias table before matching.
    pub enum RequestField {
        Request => "request",
        Channel => "channel",
        Language => "language",
        Type => "type",
        UniqueId => "uniqueId",
        Version => "version",
        CallerId => "callerId",
        CallerIdName => "callerIdName",
        CallingPres => "callingPres",
        CallingAni2 => "callingANI2",
        CallingTon => "callingTon",
        CallingTns => "callingTNS",
        Dnid => "dnid",
        Rdnis => "rdnis",
        Context => "context",
        Extension => "extension",
        Priority => "priority",
        Enhanced => "enhanced",
        AccountCode => "accountCode",
        ThreadId => "threadId",
    }
}

/// Wire header names whose attribute name differs in case.
const FIELD_ALIASES: &[(&str, RequestField)] = &[
    ("uniqueid", RequestField::UniqueId),
    ("callerid", RequestField::CallerId),
    ("calleridname", RequestField::CallerIdName),
    ("callingpres", RequestField::CallingPres),
    ("callingani2", RequestField::CallingAni2),
    ("callington", RequestField::CallingTon),
    ("callingtns", RequestField::CallingTns),
    ("accountcode", RequestField::AccountCode),
    ("threadid", RequestField::ThreadId),
];

/// Immutable record of the AGI session-start headers.
///
/// Fields absent from the header block are `None`; a header present with an
/// empty value (`agi_accountcode:`) is `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Request {
    request: Option<String>,
    channel: Option<String>,
    language: Option<String>,
    #[serde(rename = "type")]
    channel_type: Option<String>,
    unique_id: Option<String>,
    version: Option<String>,
    caller_id: Option<String>,
    caller_id_name: Option<String>,
    calling_pres: Option<String>,
    calling_ani2: Option<String>,
    calling_ton: Option<String>,
    calling_tns: Option<String>,
    dnid: Option<String>,
    rdnis: Option<String>,
    context: Option<String>,
    extension: Option<String>,
    priority: Option<String>,
    enhanced: Option<String>,
    account_code: Option<String>,
    thread_id: Option<String>,
    arguments: Vec<String>,
}

/// Maps each [`RequestField`] to its slot on [`Request`].
macro_rules! request_slots {
    ($($variant:ident => $slot:ident),* $(,)?) => {
        impl Request {
            /// Look up any named field.
            pub fn get(&self, field: RequestField) -> Option<&str> {
                match field {
                    $(RequestField::$variant => self.$slot.as_deref(),)*
                }
            }

            fn slot_mut(&mut self, field: RequestField) -> &mut Option<String> {
                match field {
                    $(RequestField::$variant => &mut self.$slot,)*
                }
            }
        }
    };
}

request_slots! {
    Request => request,
    Channel => channel,
    Language => language,
    Type => channel_type,
    UniqueId => unique_id,
    Version => version,
    CallerId => caller_id,
    CallerIdName => caller_id_name,
    CallingPres => calling_pres,
    CallingAni2 => calling_ani2,
    CallingTon => calling_ton,
    CallingTns => calling_tns,
    Dnid => dnid,
    Rdnis => rdnis,
    Context => context,
    Extension => extension,
    Priority => priority,
    Enhanced => enhanced,
    AccountCode => account_code,
    ThreadId => thread_id,
}

impl Request {
    /// Parse a raw header block. Equivalent to [`parse_request`].
    pub fn parse(raw: &str) -> AsteriskResult<Self> {
        parse_request(raw)
    }

    /// Script name (`agi_request`).
    pub fn request(&self) -> Option<&str> {
        self.get(RequestField::Request)
    }

    /// Originating channel name, e.g. `SIP/provider-0000000c`.
    pub fn channel(&self) -> Option<&str> {
        self.get(RequestField::Channel)
    }

    /// Channel language code.
    pub fn language(&self) -> Option<&str> {
        self.get(RequestField::Language)
    }

    /// Originating channel technology, e.g. `SIP` (`agi_type`).
    pub fn channel_type(&self) -> Option<&str> {
        self.get(RequestField::Type)
    }

    /// Unique call identifier.
    pub fn unique_id(&self) -> Option<&str> {
        self.get(RequestField::UniqueId)
    }

    /// Asterisk version string.
    pub fn version(&self) -> Option<&str> {
        self.get(RequestField::Version)
    }

    /// Caller ID number (or `unknown`).
    pub fn caller_id(&self) -> Option<&str> {
        self.get(RequestField::CallerId)
    }

    /// Caller ID name (or `unknown`).
    pub fn caller_id_name(&self) -> Option<&str> {
        self.get(RequestField::CallerIdName)
    }

    /// Caller ID presentation.
    pub fn calling_pres(&self) -> Option<&str> {
        self.get(RequestField::CallingPres)
    }

    /// ANI2 digits (PRI channels).
    pub fn calling_ani2(&self) -> Option<&str> {
        self.get(RequestField::CallingAni2)
    }

    /// Type of number (PRI channels).
    pub fn calling_ton(&self) -> Option<&str> {
        self.get(RequestField::CallingTon)
    }

    /// Transit network selector (PRI channels).
    pub fn calling_tns(&self) -> Option<&str> {
        self.get(RequestField::CallingTns)
    }

    /// Dialed number identifier.
    pub fn dnid(&self) -> Option<&str> {
        self.get(RequestField::Dnid)
    }

    /// Redirecting number.
    pub fn rdnis(&self) -> Option<&str> {
        self.get(RequestField::Rdnis)
    }

    /// Dialplan context.
    pub fn context(&self) -> Option<&str> {
        self.get(RequestField::Context)
    }

    /// Dialplan extension.
    pub fn extension(&self) -> Option<&str> {
        self.get(RequestField::Extension)
    }

    /// Dialplan priority.
    pub fn priority(&self) -> Option<&str> {
        self.get(RequestField::Priority)
    }

    /// `1.0` when started as EAGI, `0.0` otherwise.
    pub fn enhanced(&self) -> Option<&str> {
        self.get(RequestField::Enhanced)
    }

    /// Account code of the originating channel.
    pub fn account_code(&self) -> Option<&str> {
        self.get(RequestField::AccountCode)
    }

    /// Thread ID of the AGI script.
    pub fn thread_id(&self) -> Option<&str> {
        self.get(RequestField::ThreadId)
    }

    /// Positional script arguments in ascending `arg_N` order.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

impl FromStr for Request {
    type Err = AsteriskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_request(s)
    }
}

/// What an `agi_<key>` header name resolves to.
enum HeaderKey {
    Field(RequestField),
    Argument(u64),
}

fn resolve_key(key: &str) -> AsteriskResult<HeaderKey> {
    if let Some((_, field)) = FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
    {
        return Ok(HeaderKey::Field(*field));
    }

    if let Some(index) = key
        .strip_prefix(AGI_ARGUMENT_PREFIX)
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    {
        return Ok(HeaderKey::Argument(index.parse().unwrap_or(u64::MAX)));
    }

    RequestField::ALL
        .iter()
        .find(|field| field.as_str() == key)
        .map(|field| HeaderKey::Field(*field))
        .ok_or_else(|| AsteriskError::UnknownRequestProperty {
            name: key.to_string(),
        })
}

/// Parse the AGI session-start header block into a [`Request`].
///
/// Lines not shaped like `agi_<key>:<value>` are skipped. The key is split off
/// at the first colon, resolved through the alias table, then matched against
/// the `arg_<N>` pattern and the known attribute names. Anything else fails
/// with [`AsteriskError::UnknownRequestProperty`].
///
/// ```
/// use asterisk_agi_tokio::parse_request;
///
/// let request = parse_request("agi_channel: SIP/100-0001\nagi_uniqueid: 1450911661.12\nagi_arg_1: hello\n\n").unwrap();
/// assert_eq!(request.channel(), Some("SIP/100-0001"));
/// assert_eq!(request.unique_id(), Some("1450911661.12"));
/// assert_eq!(request.arguments(), ["hello"]);
/// ```
pub fn parse_request(raw: &str) -> AsteriskResult<Request> {
    let mut request = Request::default();
    let mut arguments: Vec<(u64, String)> = Vec::new();

    for line in raw.lines() {
        let Some(rest) = line
            .trim_start()
            .strip_prefix(AGI_HEADER_PREFIX)
        else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value
            .trim()
            .to_string();

        match resolve_key(key)? {
            HeaderKey::Argument(index) => arguments.push((index, value)),
            HeaderKey::Field(field) => *request.slot_mut(field) = Some(value),
        }
    }

    // Stable sort keeps line order for duplicate indices.
    arguments.sort_by_key(|(index, _)| *index);
    request.arguments = arguments
        .into_iter()
        .map(|(_, value)| value)
        .collect();

    Ok(request)
}
