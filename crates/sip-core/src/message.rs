//! The SIP message value handed to the transaction layer.
//!
//! A [`SipMessage`] is produced by the message layer once a datagram or
//! stream frame has been parsed and validated. The transaction layer never
//! looks inside the serialized form: it only needs the start line (method or
//! status), the branch token of the topmost Via header and the bytes to put
//! back on the wire.

use std::fmt;

use bytes::Bytes;

use crate::types::{Method, StatusCode};

/// RFC 3261 branch magic cookie (Section 8.1.1.7)
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// First line of a SIP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    /// `METHOD Request-URI SIP/2.0`
    Request {
        /// Request method
        method: Method,
        /// Request-URI as text
        uri: String,
    },
    /// `SIP/2.0 Status-Code Reason-Phrase`
    Response {
        /// Response status
        status: StatusCode,
    },
}

/// An immutable, already-validated SIP message
///
/// Cloning is cheap: the serialized form is a reference-counted [`Bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    start_line: StartLine,
    branch: Option<String>,
    cseq_method: Option<Method>,
    raw: Bytes,
}

impl SipMessage {
    /// Wraps a message produced by an external parser.
    ///
    /// `branch` is the branch parameter of the topmost Via header,
    /// `cseq_method` the method of the CSeq header (needed to tell which
    /// request a response belongs to) and `raw` the serialized form.
    pub fn new(
        start_line: StartLine,
        branch: Option<String>,
        cseq_method: Option<Method>,
        raw: Bytes,
    ) -> Self {
        Self {
            start_line,
            branch,
            cseq_method,
            raw,
        }
    }

    /// Builds a minimal request carrying a single Via with the given branch.
    ///
    /// ```rust
    /// use sigstack_sip_core::{Method, SipMessage};
    ///
    /// let invite = SipMessage::request(Method::Invite, "sip:bob@example.com", "z9hG4bK776asdhds");
    /// assert_eq!(invite.branch(), Some("z9hG4bK776asdhds"));
    /// assert!(invite.export().starts_with(b"INVITE sip:bob@example.com SIP/2.0\r\n"));
    /// ```
    pub fn request(method: Method, uri: impl Into<String>, branch: impl Into<String>) -> Self {
        let uri = uri.into();
        let branch = branch.into();
        let raw = format!(
            "{method} {uri} SIP/2.0\r\nVia: SIP/2.0/UDP sigstack.invalid;branch={branch}\r\nCSeq: 1 {method}\r\nContent-Length: 0\r\n\r\n"
        );
        Self {
            start_line: StartLine::Request {
                method: method.clone(),
                uri,
            },
            branch: Some(branch),
            cseq_method: Some(method),
            raw: Bytes::from(raw),
        }
    }

    /// Builds a minimal response to `request`, copying its branch and CSeq method.
    pub fn response_to(request: &SipMessage, status: StatusCode) -> Self {
        let branch = request.branch.clone();
        let cseq_method = request.method().cloned().or_else(|| request.cseq_method.clone());

        let mut raw = format!("SIP/2.0 {status}\r\n");
        if let Some(branch) = &branch {
            raw.push_str(&format!("Via: SIP/2.0/UDP sigstack.invalid;branch={branch}\r\n"));
        }
        if let Some(method) = &cseq_method {
            raw.push_str(&format!("CSeq: 1 {method}\r\n"));
        }
        raw.push_str("Content-Length: 0\r\n\r\n");

        Self {
            start_line: StartLine::Response { status },
            branch,
            cseq_method,
            raw: Bytes::from(raw),
        }
    }

    /// The start line of this message
    pub fn start_line(&self) -> &StartLine {
        &self.start_line
    }

    /// True for requests
    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    /// True for responses
    pub fn is_response(&self) -> bool {
        matches!(self.start_line, StartLine::Response { .. })
    }

    /// Request method, `None` for responses
    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    /// Response status, `None` for requests
    pub fn status(&self) -> Option<StatusCode> {
        match &self.start_line {
            StartLine::Response { status } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    /// Method of the CSeq header, if known
    pub fn cseq_method(&self) -> Option<&Method> {
        self.cseq_method.as_ref()
    }

    /// Branch parameter of the topmost Via header
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// True when the branch carries the RFC 3261 magic cookie
    pub fn has_rfc3261_branch(&self) -> bool {
        self.branch
            .as_deref()
            .map(|b| b.starts_with(BRANCH_MAGIC_COOKIE))
            .unwrap_or(false)
    }

    /// Serialized form of the message, ready for the transport
    pub fn export(&self) -> Bytes {
        self.raw.clone()
    }

    /// Length of the serialized form in bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// True when the serialized form is empty
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl fmt::Display for SipMessage {
    /// One-line summary used in logs: start line plus branch.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Request { method, uri } => write!(f, "{method} {uri}")?,
            StartLine::Response { status } => {
                write!(f, "{status}")?;
                if let Some(method) = &self.cseq_method {
                    write!(f, " ({method})")?;
                }
            }
        }
        if let Some(branch) = &self.branch {
            write!(f, " branch={branch}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accessors() {
        let msg = SipMessage::request(Method::Options, "sip:alice@example.com", "z9hG4bKabc");
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some(&Method::Options));
        assert_eq!(msg.status(), None);
        assert!(msg.has_rfc3261_branch());
        assert_eq!(msg.to_string(), "OPTIONS sip:alice@example.com branch=z9hG4bKabc");
    }

    #[test]
    fn response_copies_branch_and_cseq_method() {
        let invite = SipMessage::request(Method::Invite, "sip:bob@example.com", "z9hG4bKxyz");
        let busy = SipMessage::response_to(&invite, StatusCode::BusyHere);
        assert!(busy.is_response());
        assert_eq!(busy.branch(), Some("z9hG4bKxyz"));
        assert_eq!(busy.cseq_method(), Some(&Method::Invite));
        assert_eq!(busy.status(), Some(StatusCode::BusyHere));
        assert!(busy.export().starts_with(b"SIP/2.0 486 Busy Here\r\n"));
    }

    #[test]
    fn externally_parsed_message_without_branch() {
        let msg = SipMessage::new(
            StartLine::Request {
                method: Method::Bye,
                uri: "sip:carol@example.com".into(),
            },
            None,
            Some(Method::Bye),
            Bytes::from_static(b"BYE sip:carol@example.com SIP/2.0\r\n\r\n"),
        );
        assert_eq!(msg.branch(), None);
        assert!(!msg.has_rfc3261_branch());
        assert!(!msg.is_empty());
    }
}
