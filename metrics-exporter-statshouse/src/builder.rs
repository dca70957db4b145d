use std::{net::SocketAddr, sync::Arc, time::Duration};

use parking_lot::Mutex;
use quanta::Clock;
use thiserror::Error;

use crate::{
    client::StatsHouseClient,
    forwarder::{sync::Forwarder, RemoteAddr, Transport, UdpTransport},
    recorder::{StatsHouseHandle, StatsHouseRecorder},
    writer::{PayloadWriter, MAX_PAYLOAD_SIZE, MIN_PAYLOAD_LEN},
};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_PORT: u16 = 13337;

/// Largest payload a single UDP datagram can carry over IPv4.
const MAX_UDP_PAYLOAD_LEN: usize = 65_507;

/// Errors that could occur while building or installing a StatsHouse client/recorder.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The maximum payload length is outside of the supported range.
    #[error("invalid maximum payload length {len} (must be between {} and {})", MIN_PAYLOAD_LEN, MAX_UDP_PAYLOAD_LEN)]
    InvalidPayloadLength {
        /// The configured length.
        len: usize,
    },

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[error("failed to install exporter as global recorder")]
    FailedToInstall,
}

/// Builder for a StatsHouse client.
pub struct StatsHouseBuilder {
    remote_addr: RemoteAddr,
    write_timeout: Duration,
    max_payload_len: usize,
    flush_interval: Duration,
    clock: Clock,
}

impl StatsHouseBuilder {
    /// Set the remote address of the aggregator.
    ///
    /// The address needs to be in the format of `<host>:<port>`.
    ///
    /// Defaults to `127.0.0.1:13337`.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating the
    /// reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        self.remote_addr = RemoteAddr::try_from(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        Ok(self)
    }

    /// Set the write timeout of the UDP socket.
    ///
    /// A zero timeout disables it.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum payload length.
    ///
    /// This is the size of the largest datagram the client will send. Records are packed into datagrams up to this
    /// size, and long value arrays are split so that every part fits.
    ///
    /// Defaults to 1232 bytes, which fits the minimum IPv6 MTU and therefore never fragments.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the flush interval.
    ///
    /// Records are buffered for up to this long before being sent together, which bounds both the number of datagrams
    /// and the delay before a record reaches the aggregator.
    ///
    /// Defaults to 250 milliseconds.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds a client that sends over UDP.
    ///
    /// No socket is opened until the first flush.
    ///
    /// # Errors
    ///
    /// If the maximum payload length is out of range, an error will be returned.
    pub fn build(self) -> Result<StatsHouseClient<UdpTransport>, BuildError> {
        let transport = UdpTransport::new(self.remote_addr.clone(), self.write_timeout);
        self.build_with_transport(transport)
    }

    /// Builds a client that sends through the given transport.
    ///
    /// # Errors
    ///
    /// If the maximum payload length is out of range, an error will be returned.
    pub fn build_with_transport<T>(self, transport: T) -> Result<StatsHouseClient<T>, BuildError>
    where
        T: Transport,
    {
        if !(MIN_PAYLOAD_LEN..=MAX_UDP_PAYLOAD_LEN).contains(&self.max_payload_len) {
            return Err(BuildError::InvalidPayloadLength { len: self.max_payload_len });
        }

        let writer = PayloadWriter::new(self.max_payload_len);
        let forwarder = Forwarder::new(transport, self.flush_interval, self.clock);

        Ok(StatsHouseClient::new(writer, forwarder))
    }

    /// Builds a [`metrics`] recorder backed by a UDP client.
    ///
    /// The recorder must be installed by the caller.
    ///
    /// # Errors
    ///
    /// If the maximum payload length is out of range, an error will be returned.
    pub fn build_recorder(self) -> Result<StatsHouseRecorder, BuildError> {
        let client = self.build()?;
        Ok(StatsHouseRecorder::new(Arc::new(Mutex::new(client))))
    }

    /// Builds the recorder and installs it as the global recorder, returning a handle to it.
    ///
    /// The handle is the only way to flush or close the client once it is installed.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or if a global recorder is already installed, an error will be returned.
    pub fn install(self) -> Result<StatsHouseHandle, BuildError> {
        let recorder = self.build_recorder()?;
        let handle = recorder.handle();

        metrics::set_global_recorder(recorder).map_err(|_| BuildError::FailedToInstall)?;

        Ok(handle)
    }
}

impl Default for StatsHouseBuilder {
    fn default() -> Self {
        StatsHouseBuilder {
            remote_addr: RemoteAddr::from(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_len: MAX_PAYLOAD_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            clock: Clock::new(),
        }
    }
}
