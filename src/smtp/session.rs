//! The per-connection SMTP state machine.
//!
//! A `Session` only remembers whether a DATA block is open. Every other line is
//! acknowledged unconditionally, so a client can complete a full transaction
//! without the sink ever rejecting it. Command sequencing is not validated.

use std::fmt;

/// Where the conversation currently stands.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    /// Waiting for the next command. Initial state.
    #[default]
    AwaitingCommand,
    /// A `DATA` command was accepted; lines are message body until a `.` line.
    InData,
}

/// A single-line status reply sent back to the client.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SmtpReply {
    pub code: u16,
    pub message: &'static str,
}

impl SmtpReply {
    pub const OK: SmtpReply = SmtpReply {
        code: 250,
        message: "Ok",
    };
    pub const START_DATA: SmtpReply = SmtpReply {
        code: 354,
        message: "End data with <CR><LF>.<CR><LF>",
    };
    pub const QUEUED: SmtpReply = SmtpReply {
        code: 250,
        message: "Ok: queued as 31337",
    };
    pub const BYE: SmtpReply = SmtpReply {
        code: 221,
        message: "Bye",
    };
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// What the connection handler should do with a line after the session saw it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LineOutcome {
    /// Send the reply and keep reading.
    Respond(SmtpReply),
    /// Body content inside a DATA block. Nothing is sent.
    Consumed,
    /// Send the reply, then close the connection.
    Close(SmtpReply),
}

/// State for one client connection.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while message body lines are being consumed.
    pub fn in_data(&self) -> bool {
        self.state == SessionState::InData
    }

    /// Advances the state machine by one received line.
    ///
    /// The line is trimmed and lowercased before inspection, so command
    /// matching is case-insensitive. `quit` ends the session in either state.
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let line = normalize_line(line);

        if line == "quit" {
            return LineOutcome::Close(SmtpReply::BYE);
        }

        match self.state {
            SessionState::AwaitingCommand if line.starts_with("data") => {
                self.state = SessionState::InData;
                LineOutcome::Respond(SmtpReply::START_DATA)
            }
            SessionState::AwaitingCommand => LineOutcome::Respond(SmtpReply::OK),
            SessionState::InData if line.starts_with('.') => {
                self.state = SessionState::AwaitingCommand;
                LineOutcome::Respond(SmtpReply::QUEUED)
            }
            SessionState::InData => LineOutcome::Consumed,
        }
    }
}

/// Trims surrounding whitespace and lowercases a received line.
pub fn normalize_line(line: &str) -> String {
    line.trim().to_lowercase()
}
