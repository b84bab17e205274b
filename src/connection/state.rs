//! Close handshake state
//!
//! `Connected -> Closing -> Closed`. The transport is closed on every path
//! out of `Closing`, so a failed handshake never leaves a socket behind.

use tracing::{debug, warn};

use crate::console::Console;
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::protocol::{ClientMessage, Protocol};

/// Close handshake phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePhase {
    /// Transport open, nothing sent yet
    Connected,
    /// `Close` sent, waiting for `Ok(bye!)`
    Closing,
    /// Transport closed; `clean` is false when the exchange failed
    Closed { clean: bool },
}

/// Drives one session through the close handshake
pub struct CloseHandshake<'a> {
    protocol: &'a mut dyn Protocol,
    console: &'a Console,
    wait_for_disconnect: bool,
    be_quiet: bool,
    phase: ClosePhase,
}

impl<'a> CloseHandshake<'a> {
    pub fn new(protocol: &'a mut dyn Protocol, console: &'a Console) -> Self {
        Self {
            protocol,
            console,
            wait_for_disconnect: true,
            be_quiet: false,
            phase: ClosePhase::Connected,
        }
    }

    /// Wait for the peer to drop the connection after `Ok(bye!)`
    pub fn wait_for_disconnect(mut self, wait: bool) -> Self {
        self.wait_for_disconnect = wait;
        self
    }

    pub fn quiet(mut self, be_quiet: bool) -> Self {
        self.be_quiet = be_quiet;
        self
    }

    pub fn phase(&self) -> ClosePhase {
        self.phase
    }

    /// Run the handshake to completion.
    ///
    /// A transport that already reports itself disconnected skips the
    /// exchange and counts as a clean close.
    pub fn run(&mut self) -> Result<()> {
        if !self.protocol.connection().is_connected() {
            debug!("Transport already closed, skipping close handshake");
            self.phase = ClosePhase::Closed { clean: true };
            return Ok(());
        }

        self.phase = ClosePhase::Closing;
        let result = self.exchange();

        self.protocol.connection_mut().close();
        self.phase = ClosePhase::Closed {
            clean: result.is_ok(),
        };
        result
    }

    fn exchange(&mut self) -> Result<()> {
        self.protocol.send(&ClientMessage::Close)?;

        let reply = self.protocol.recv_single_message()?;
        if !self.be_quiet {
            self.console.print(&reply);
        }

        if !reply.is_bye() {
            METRICS.close_violation();
            warn!(received = %reply.summary(), "Unexpected reply to Close");
            return Err(Error::ProtocolViolation {
                received: reply.summary(),
            });
        }

        if self.wait_for_disconnect {
            // The server is expected to drop the connection now; an error here is that drop
            if let Ok(extra) = self.protocol.recv_single_message() {
                warn!(received = %extra.summary(), "Message received after Ok(bye!)");
                if !self.be_quiet {
                    self.console
                        .print_error(format_args!("Was expecting closure but got message:{}", extra));
                }
            }
        }

        Ok(())
    }
}
