use std::{io, time::Duration};

use quanta::{Clock, Instant};
use tracing::{debug, error, trace};

use crate::writer::{FlushError, PayloadSink};

use super::Transport;

enum ClientState<C> {
    // No connection yet, or the last one was torn down.
    Disconnected,

    // Connected and ready to send.
    Ready(C),
}

impl<C> ClientState<C> {
    fn connect<T>(&mut self, transport: &mut T) -> io::Result<()>
    where
        T: Transport<Connection = C>,
    {
        if let ClientState::Disconnected = self {
            *self = ClientState::Ready(transport.connect()?);
            debug!("Connected to aggregator.");
        }

        Ok(())
    }

    fn send<T>(&mut self, transport: &mut T, payload: &[u8]) -> io::Result<()>
    where
        T: Transport<Connection = C>,
    {
        match self {
            ClientState::Disconnected => {
                Err(io::Error::new(io::ErrorKind::NotConnected, "not connected to aggregator"))
            }
            ClientState::Ready(conn) => match transport.send(conn, payload)? {
                n if n == payload.len() => Ok(()),
                n => Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {n} of {} bytes", payload.len()),
                )),
            },
        }
    }

    fn disconnect<T>(&mut self, transport: &mut T)
    where
        T: Transport<Connection = C>,
    {
        if let ClientState::Ready(conn) = std::mem::replace(self, ClientState::Disconnected) {
            transport.close(conn);
            debug!("Disconnected from aggregator.");
        }
    }
}

/// Owns the outgoing buffer and the connection, and decides when the buffer is sent.
///
/// Records accumulate for up to the flush interval before being sent together. Once switched into immediate mode
/// (see [`Forwarder::close`]), every flush-policy check sends and closes right away.
pub struct Forwarder<T: Transport> {
    transport: T,
    client_state: ClientState<T::Connection>,
    buf: Vec<u8>,
    clock: Clock,
    flush_interval: Duration,
    last_flush: Instant,
    immediate_flush: bool,
}

impl<T: Transport> Forwarder<T> {
    /// Creates a new synchronous `Forwarder`.
    pub fn new(transport: T, flush_interval: Duration, clock: Clock) -> Self {
        Forwarder {
            transport,
            client_state: ClientState::Disconnected,
            buf: Vec::new(),
            last_flush: clock.now(),
            clock,
            flush_interval,
            immediate_flush: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buf
    }

    #[cfg(test)]
    pub(crate) fn is_immediate(&self) -> bool {
        self.immediate_flush
    }

    /// Establishes the connection if there is none.
    ///
    /// The buffer is left untouched on failure.
    pub fn maybe_connect(&mut self) -> Result<(), FlushError> {
        self.client_state.connect(&mut self.transport).map_err(FlushError::Connect)
    }

    /// Sends the whole buffer as one datagram.
    ///
    /// On a send failure, or when `close_after` is set, the connection is torn down so the next flush reconnects. The
    /// buffer is only cleared by a successful send; on failure the same bytes are retried by the next flush.
    pub fn flush(&mut self, close_after: bool) -> Result<(), FlushError> {
        if self.buf.is_empty() {
            if close_after {
                self.client_state.disconnect(&mut self.transport);
            }
            return Ok(());
        }

        self.maybe_connect()?;

        let result = self.client_state.send(&mut self.transport, &self.buf);
        if result.is_err() || close_after {
            self.client_state.disconnect(&mut self.transport);
        }

        match result {
            Ok(()) => {
                debug!(bytes = self.buf.len(), close_after, "Flushed payload.");
                self.buf.clear();
                self.last_flush = self.clock.now();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, bytes = self.buf.len(), "Failed to send payload.");
                Err(FlushError::Write(e))
            }
        }
    }

    /// Applies the flush policy.
    ///
    /// In immediate mode the buffer is flushed and the connection closed. Otherwise the buffer is flushed once it has
    /// been waiting longer than the flush interval since the last successful flush.
    pub fn maybe_flush(&mut self) -> Result<(), FlushError> {
        if self.immediate_flush {
            return self.flush(true);
        }

        if self.interval_elapsed() {
            return self.flush(false);
        }

        Ok(())
    }

    /// Returns `true` if there is something buffered and the flush interval has passed since the last flush.
    fn interval_elapsed(&self) -> bool {
        if self.buf.is_empty() {
            return false;
        }

        let waited = self.clock.now().saturating_duration_since(self.last_flush);
        if waited > self.flush_interval {
            trace!(?waited, "Flush interval elapsed.");
            true
        } else {
            false
        }
    }

    /// Performs the final flush and closes the connection.
    ///
    /// The forwarder stays usable afterwards, but in immediate mode: everything appended later is sent and the
    /// connection closed right away.
    pub fn close(&mut self) -> Result<(), FlushError> {
        self.immediate_flush = true;
        self.flush(true)
    }
}

impl<T: Transport> PayloadSink for Forwarder<T> {
    fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn append(&mut self, parts: &[&[u8]]) {
        for part in parts {
            self.buf.extend_from_slice(part);
        }
    }

    fn flush(&mut self) -> Result<(), FlushError> {
        Forwarder::flush(self, false)
    }

    fn flush_expired(&mut self) -> Result<(), FlushError> {
        if self.interval_elapsed() {
            Forwarder::flush(self, false)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockTransport;

    const INTERVAL: Duration = Duration::from_millis(250);

    fn append(forwarder: &mut Forwarder<MockTransport>, bytes: &[u8]) {
        forwarder.append(&[bytes]);
    }

    fn forwarder() -> (Forwarder<MockTransport>, MockTransport, std::sync::Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let transport = MockTransport::default();
        (Forwarder::new(transport.clone(), INTERVAL, clock), transport, mock)
    }

    #[test]
    fn connects_lazily() {
        let (mut forwarder, transport, _) = forwarder();
        assert_eq!(transport.connects(), 0);

        forwarder.flush(false).unwrap();
        assert_eq!(transport.connects(), 0);

        append(&mut forwarder, b"abcd");
        forwarder.flush(false).unwrap();
        append(&mut forwarder, b"efgh");
        forwarder.flush(false).unwrap();

        assert_eq!(transport.connects(), 1);
        assert_eq!(transport.datagrams(), vec![b"abcd".to_vec(), b"efgh".to_vec()]);
        assert!(forwarder.buffered().is_empty());
    }

    #[test]
    fn send_failure_keeps_buffer_and_reconnects() {
        let (mut forwarder, transport, _) = forwarder();
        append(&mut forwarder, b"abcd");

        transport.fail_send(true);
        assert!(matches!(forwarder.flush(false), Err(FlushError::Write(_))));
        assert_eq!(forwarder.buffered(), b"abcd");
        assert_eq!(transport.closes(), 1);

        transport.fail_send(false);
        forwarder.flush(false).unwrap();
        assert_eq!(transport.connects(), 2);
        assert_eq!(transport.datagrams(), vec![b"abcd".to_vec()]);
    }

    #[test]
    fn connect_failure_keeps_buffer() {
        let (mut forwarder, transport, _) = forwarder();
        append(&mut forwarder, b"abcd");

        transport.fail_connect(true);
        assert!(matches!(forwarder.flush(false), Err(FlushError::Connect(_))));
        assert_eq!(forwarder.buffered(), b"abcd");
        assert!(matches!(forwarder.maybe_connect(), Err(FlushError::Connect(_))));

        transport.fail_connect(false);
        forwarder.maybe_connect().unwrap();
        assert_eq!(transport.connects(), 1);
        assert!(transport.datagrams().is_empty());
    }

    #[test]
    fn close_after_tears_down_connection() {
        let (mut forwarder, transport, _) = forwarder();
        append(&mut forwarder, b"abcd");
        forwarder.flush(true).unwrap();
        assert_eq!(transport.closes(), 1);

        append(&mut forwarder, b"efgh");
        forwarder.flush(false).unwrap();
        assert_eq!(transport.connects(), 2);
    }

    #[test]
    fn flushes_after_interval() {
        let (mut forwarder, transport, mock) = forwarder();
        append(&mut forwarder, b"abcd");

        mock.increment(Duration::from_millis(100));
        forwarder.maybe_flush().unwrap();
        assert!(transport.datagrams().is_empty());

        mock.increment(Duration::from_millis(200));
        forwarder.maybe_flush().unwrap();
        assert_eq!(transport.datagrams().len(), 1);

        append(&mut forwarder, b"efgh");
        forwarder.flush_expired().unwrap();
        assert_eq!(transport.datagrams().len(), 1);
        mock.increment(Duration::from_millis(300));
        forwarder.flush_expired().unwrap();
        assert_eq!(transport.datagrams().len(), 2);

        // Nothing buffered, nothing sent.
        mock.increment(Duration::from_secs(1));
        forwarder.maybe_flush().unwrap();
        assert_eq!(transport.datagrams().len(), 2);
    }

    #[test]
    fn immediate_mode_after_close() {
        let (mut forwarder, transport, _) = forwarder();
        append(&mut forwarder, b"abcd");
        forwarder.close().unwrap();
        assert!(forwarder.is_immediate());
        assert_eq!(transport.datagrams().len(), 1);
        assert_eq!(transport.closes(), 1);

        append(&mut forwarder, b"efgh");
        forwarder.maybe_flush().unwrap();
        assert_eq!(transport.datagrams().len(), 2);
        assert_eq!(transport.closes(), 2);
    }
}
