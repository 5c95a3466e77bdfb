//! Typed header names for Asterisk Manager Interface frames.

/// Error returned when parsing an unrecognized manager header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseManagerHeaderError(pub String);

impl std::fmt::Display for ParseManagerHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown manager header: {}", self.0)
    }
}

impl std::error::Error for ParseManagerHeaderError {}

define_header_enum! {
    error_type: ParseManagerHeaderError,
    /// Header names the manager engine reads or writes itself.
    ///
    /// Lookups on [`ManagerFrame::header()`](crate::ManagerFrame::header) are
    /// case-sensitive, so these carry the exact spelling Asterisk emits.
    pub enum ManagerHeader {
        Action => "Action",
        ActionId => "ActionID",
        Event => "Event",
        Response => "Response",
        EventList => "EventList",
        Message => "Message",
        Username => "Username",
        Secret => "Secret",
        Privilege => "Privilege",
    }
}
