//! Outbound manager action serialization

use crate::{
    constants::LINE_TERMINATOR,
    error::{AsteriskError, AsteriskResult},
    headers::ManagerHeader,
};

pub(crate) fn validate_no_newlines(s: &str, context: &str) -> AsteriskResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AsteriskError::ProtocolError {
            message: format!("{} must not contain newlines", context),
        });
    }
    Ok(())
}

/// Opaque action identifier: per-session sequence number plus a random
/// suffix.
pub(crate) fn generate_action_id(seq: u64) -> String {
    format!("A{}-{:08x}", seq, fastrand::u32(..))
}

/// Value of one action parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionValue {
    /// One `Key: Value` line
    Single(String),
    /// One `Key: Value` line per element, e.g. repeated `Variable` headers
    List(Vec<String>),
}

/// One manager action: `Action: <name>` followed by parameter lines.
///
/// ```
/// use asterisk_agi_tokio::ManagerAction;
///
/// let action = ManagerAction::new("Originate")
///     .param("Channel", "SIP/100")
///     .param_list("Variable", ["a=1", "b=2"])
///     .param("ActionID", "call-1");
/// assert_eq!(action.action_id(), Some("call-1"));
/// assert_eq!(
///     action.to_wire_format().unwrap(),
///     "Action: Originate\r\nChannel: SIP/100\r\nVariable: a=1\r\nVariable: b=2\r\nActionID: call-1\r\n\r\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerAction {
    name: String,
    params: Vec<(String, ActionValue)>,
}

impl ManagerAction {
    /// Action with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Append a single-valued parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .push((key.into(), ActionValue::Single(value.into())));
        self
    }

    /// Append a list-valued parameter, written as one line per element.
    pub fn param_list<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(Into::into)
            .collect();
        self.params
            .push((key.into(), ActionValue::List(values)));
        self
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in insertion order.
    pub fn params(&self) -> &[(String, ActionValue)] {
        &self.params
    }

    /// Caller-supplied action ID: the first non-empty single-valued parameter
    /// named `actionid` in any case.
    pub fn action_id(&self) -> Option<&str> {
        self.params
            .iter()
            .find_map(|(key, value)| match value {
                ActionValue::Single(id)
                    if key.eq_ignore_ascii_case(ManagerHeader::ActionId.as_str())
                        && !id.is_empty() =>
                {
                    Some(id.as_str())
                }
                _ => None,
            })
    }

    /// Return the action ID, appending a generated `ActionID` parameter if the
    /// caller supplied none.
    pub(crate) fn ensure_action_id(&mut self, seq: u64) -> String {
        if let Some(id) = self.action_id() {
            return id.to_string();
        }
        let id = generate_action_id(seq);
        self.params
            .push((
                ManagerHeader::ActionId.to_string(),
                ActionValue::Single(id.clone()),
            ));
        id
    }

    /// Serialize to the wire: `Key: Value\r\n` lines and a blank line.
    ///
    /// Fails if any name or value contains a line break.
    pub fn to_wire_format(&self) -> AsteriskResult<String> {
        validate_no_newlines(&self.name, "action name")?;

        let mut wire = format!(
            "{}: {}{}",
            ManagerHeader::Action,
            self.name,
            LINE_TERMINATOR
        );
        for (key, value) in &self.params {
            validate_no_newlines(key, "parameter name")?;
            let values: &[String] = match value {
                ActionValue::Single(v) => std::slice::from_ref(v),
                ActionValue::List(vs) => vs,
            };
            for v in values {
                validate_no_newlines(v, key)?;
                wire.push_str(key);
                wire.push_str(": ");
                wire.push_str(v);
                wire.push_str(LINE_TERMINATOR);
            }
        }
        wire.push_str(LINE_TERMINATOR);
        Ok(wire)
    }

    /// One-line rendering for logs with the secret masked.
    pub(crate) fn redacted(&self) -> String {
        let mut line = self
            .name
            .clone();
        for (key, value) in &self.params {
            let shown = if key.eq_ignore_ascii_case(ManagerHeader::Secret.as_str()) {
                "[REDACTED]".to_string()
            } else {
                match value {
                    ActionValue::Single(v) => v.clone(),
                    ActionValue::List(vs) => vs.join("|"),
                }
            };
            line.push_str(&format!(" {}={}", key, shown));
        }
        line
    }
}
