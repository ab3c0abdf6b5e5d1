//! The immutable contract for one request/response exchange with the modem.

use regex::Regex;

/// What goes out on the wire for a command.
#[derive(Debug, Clone)]
pub enum Payload {
    /// ASCII text, sent with a trailing CRLF.
    Text(String),
    /// Raw bytes, sent verbatim. Used only for the `SBDWB` phase-2 write.
    Bytes(Vec<u8>),
    /// Nothing is written; the descriptor only waits for an unsolicited
    /// line to match its success pattern. Used by `waitForNetwork`, which
    /// listens for `+CIEV:0,N` without issuing a command of its own.
    None,
}

impl Payload {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(b.into())
    }
}

/// No-timeout sentinel for [`CommandDescriptor::timeout`].
pub const NO_TIMEOUT: Option<std::time::Duration> = None;

/// One AT request and the rules for recognising its response.
///
/// Built by the [`crate::catalog`] wrappers and the [`crate::session`]
/// orchestrator; consumed by [`crate::engine::CommandEngine::execute`].
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    /// What gets written to the transport.
    pub payload: Payload,
    /// Free-form diagnostic label, used in logs only.
    pub description: String,
    /// `None` means "wait forever" (used for the SBDWB phase-2 write and
    /// `waitForNetwork` by default).
    pub timeout: Option<std::time::Duration>,
    /// Regex over one inbound line marking completion.
    pub success_pattern: Regex,
    /// Regex over one inbound line marking failure. Defaults to `^ERROR$`.
    pub error_pattern: Regex,
    /// Regex selecting which inbound lines get appended to the
    /// accumulated response payload. `None` means nothing is buffered
    /// (most commands use a bare `^OK$` success pattern and no buffer).
    pub buffer_pattern: Option<Regex>,
}

impl CommandDescriptor {
    /// Build a descriptor for a literal text command whose only outcome
    /// is `OK`/`ERROR` (the overwhelming majority of the catalog).
    #[must_use]
    pub fn simple(request: impl Into<String>, timeout: std::time::Duration) -> Self {
        let request = request.into();
        Self {
            description: request.clone(),
            payload: Payload::text(request),
            timeout: Some(timeout),
            success_pattern: ok_pattern(),
            error_pattern: error_pattern(),
            buffer_pattern: None,
        }
    }

    /// Build a descriptor that also buffers lines matching `buffer_pattern`
    /// into the accumulated response (e.g. `+CSQ:`, `+SBDS:` style replies).
    #[must_use]
    pub fn with_buffer(
        request: impl Into<String>,
        timeout: std::time::Duration,
        buffer_pattern: Regex,
    ) -> Self {
        let mut cmd = Self::simple(request, timeout);
        cmd.buffer_pattern = Some(buffer_pattern);
        cmd
    }

    /// Override the success pattern (e.g. `waitForNetwork`'s dynamic
    /// `^\+CIEV:0,[n-5]` pattern).
    #[must_use]
    pub fn with_success_pattern(mut self, pattern: Regex) -> Self {
        self.success_pattern = pattern;
        self
    }

    /// Build a descriptor that writes nothing and only waits for an
    /// unsolicited line matching `success_pattern` — `waitForNetwork`'s
    /// `+CIEV` listener.
    #[must_use]
    pub fn wait_for(
        description: impl Into<String>,
        success_pattern: Regex,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        Self {
            description: description.into(),
            payload: Payload::None,
            timeout,
            success_pattern,
            error_pattern: error_pattern(),
            buffer_pattern: None,
        }
    }

    /// Override the timeout, including to [`NO_TIMEOUT`] for "wait forever".
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `^OK$`, shared by most of the catalog.
pub fn ok_pattern() -> Regex {
    Regex::new(r"^OK$").expect("static pattern is valid")
}

/// `^ERROR$`, the default error pattern for commands that don't declare
/// a custom one.
pub fn error_pattern() -> Regex {
    Regex::new(r"^ERROR$").expect("static pattern is valid")
}

/// The unsolicited ring-alert line. Never completes a pending command.
pub fn ring_alert_pattern() -> Regex {
    Regex::new(r"^SBDRING$").expect("static pattern is valid")
}
