//! Guest-visible call surface.
//!
//! An interpreter binds its ambient callables (output writes, `send_result`,
//! `input`, the rewriter's exception reporter) to a [`GuestHost`] for the
//! duration of one run. The host borrows the session exclusively, so output
//! redirection is scoped to the run and released however the run ends.

use crate::{
    capture::{CaptureWriter, Channel},
    error::{BridgeError, GuestException},
    input::{InputError, InputPort},
    session::ExecutionSession,
    value::GuestValue,
};

/// Session-bound callables exposed to guest code during a run.
pub struct GuestHost<'a> {
    session: &'a mut ExecutionSession,
    input: InputPort,
    echo_prompt: bool,
}

impl<'a> GuestHost<'a> {
    #[must_use]
    pub const fn new(session: &'a mut ExecutionSession, input: InputPort, echo_prompt: bool) -> Self {
        Self {
            session,
            input,
            echo_prompt,
        }
    }

    /// Append `text` to a capture channel. Never fails.
    pub fn write(&mut self, channel: Channel, text: &str) -> usize {
        self.session.capture_mut().write(channel, text)
    }

    /// Byte writer for interpreters that emit raw bytes.
    pub fn writer(&mut self, channel: Channel) -> CaptureWriter<'_> {
        self.session.capture_mut().writer(channel)
    }

    /// `send_result(value)`.
    ///
    /// # Errors
    /// Returns [`BridgeError::ProtocolViolation`] on a second call; the
    /// interpreter should raise it into the guest.
    pub fn send_result(&mut self, value: GuestValue) -> Result<(), BridgeError> {
        self.session.missive_mut().send(value)
    }

    /// `input(prompt)`: echo the prompt, then suspend until the host answers.
    ///
    /// # Errors
    /// Fails when no host answers; interpreters surface this as end-of-input.
    pub async fn input(&mut self, prompt: &str) -> Result<String, InputError> {
        if self.echo_prompt && !prompt.is_empty() {
            self.write(Channel::Stdout, prompt);
        }
        self.input.request(prompt).await
    }

    /// Record a caught guest exception as one `kind: message` line on stderr.
    pub fn report_exception(&mut self, exc: GuestException) {
        self.session.record_failure(exc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::input_channel;

    #[tokio::test]
    async fn test_prompt_echo_and_resume() {
        let mut session = ExecutionSession::new();
        let (port, mut requests) = input_channel();
        {
            let mut host = GuestHost::new(&mut session, port, true);
            host.write(Channel::Stdout, "start\n");
            let (answer, ()) = tokio::join!(host.input("age? "), async {
                requests.next().await.unwrap().respond("42").unwrap();
            });
            assert_eq!(answer.unwrap(), "42");
        }
        assert_eq!(session.capture().read(Channel::Stdout), "start\nage? ");
    }

    #[tokio::test]
    async fn test_no_echo_when_disabled() {
        let mut session = ExecutionSession::new();
        let mut host = GuestHost::new(&mut session, InputPort::detached(), false);
        assert_eq!(host.input("x? ").await, Err(InputError::NoHost));
        drop(host);
        assert_eq!(session.capture().read(Channel::Stdout), "");
    }

    #[test]
    fn test_report_exception_line() {
        let mut session = ExecutionSession::new();
        let mut host = GuestHost::new(&mut session, InputPort::detached(), true);
        host.report_exception(GuestException::new("KeyError", "'x'"));
        host.send_result(GuestValue::Null).unwrap();
        assert!(host.send_result(GuestValue::Null).is_err());
        drop(host);
        assert_eq!(session.capture().read(Channel::Stderr), "KeyError: 'x'\n");
        assert_eq!(session.failure().unwrap().kind, "KeyError");
    }
}
