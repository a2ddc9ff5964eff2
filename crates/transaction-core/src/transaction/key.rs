use std::fmt;

use sigstack_sip_core::{Method, SipMessage};

/// Identifies a server transaction (RFC 3261 Section 17.2.3)
///
/// The branch of the topmost Via plus the request method, so that an INVITE
/// and the CANCEL sent for it share a branch but not a transaction. An ACK
/// belongs to the INVITE transaction with the same branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    branch: String,
    method: Method,
}

impl TransactionKey {
    /// Creates a key from its parts
    pub fn new(branch: impl Into<String>, method: Method) -> Self {
        Self {
            branch: branch.into(),
            method,
        }
    }

    /// Key of the server transaction an inbound request belongs to.
    ///
    /// `None` for responses and for requests without a branch.
    pub fn from_request(request: &SipMessage) -> Option<Self> {
        let method = match request.method()? {
            Method::Ack => Method::Invite,
            method => method.clone(),
        };
        let branch = request.branch().filter(|b| !b.is_empty())?;
        Some(Self::new(branch, method))
    }

    /// Key of the server transaction a response is sent by, from its branch and CSeq method
    pub fn from_response(response: &SipMessage) -> Option<Self> {
        if !response.is_response() {
            return None;
        }
        let branch = response.branch().filter(|b| !b.is_empty())?;
        Some(Self::new(branch, response.cseq_method()?.clone()))
    }

    /// The branch parameter
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Method of the request that created the transaction
    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.branch, self.method)
    }
}
