use std::sync::mpsc::Receiver;

use anyhow::Result;
use foldwatch_types::ClientMessage;

/// Connection to a live client process.
///
/// Implementations own the wire protocol end to end; everything that crosses
/// this trait is already a typed [`ClientMessage`]. The runtime never parses
/// bytes off a socket.
pub trait Transport: Send {
    fn connect(&mut self, host: &str, port: u16, password: Option<&str>) -> Result<()>;

    fn close(&mut self);

    fn is_connected(&self) -> bool;

    fn send_command(&mut self, command: &str) -> Result<()>;

    /// Pushed updates, in arrival order. The receiver stays valid across
    /// reconnects of the same transport.
    fn messages(&self) -> &Receiver<ClientMessage>;
}
