use tracing::warn;

use crate::{
    error::Error,
    forwarder::{sync::Forwarder, Transport, UdpTransport},
    header::Tags,
    writer::{PackError, PayloadWriter},
};

const FLUSH_LABEL: &str = "flush";
const DEFERRED_FLUSH_LABEL: &str = "deferred";

/// A client that sends metrics to a StatsHouse aggregator.
///
/// Writes are buffered and sent in batches: a batch goes out once it has been waiting longer than the flush interval,
/// or earlier when the next record would not fit into the same datagram.
///
/// # Lifecycle
///
/// Call [`close`](StatsHouseClient::close) before the process exits so that the last batch is sent. Dropping the
/// client performs the same final flush, but any error is only logged.
///
/// # Concurrency
///
/// The client is not synchronized. To share one between threads, wrap the whole client in a single mutex.
///
/// # Send failures
///
/// When sending fails, the batch stays buffered and is retried with the next flush. A write whose flush was only due
/// to the flush interval still buffers its record before reporting the failure. It is never aged out, so while the
/// aggregator stays unreachable, later writes keep failing once the buffer has no room left for them.
pub struct StatsHouseClient<T: Transport = UdpTransport> {
    writer: PayloadWriter,
    forwarder: Forwarder<T>,
}

impl<T: Transport> StatsHouseClient<T> {
    pub(crate) fn new(writer: PayloadWriter, forwarder: Forwarder<T>) -> Self {
        StatsHouseClient { writer, forwarder }
    }

    /// Writes a counter.
    ///
    /// A `timestamp` of `None` or zero lets the aggregator assign the time of arrival.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderTooLarge`] if the record cannot fit into a datagram on its own; nothing is buffered in
    /// that case. Returns [`Error::ConnectFailed`] or [`Error::WriteFailed`] if a flush triggered by this write fails.
    pub fn write_count(
        &mut self,
        metric: &str,
        tags: &Tags<'_>,
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), Error> {
        let result = self.writer.write_count(&mut self.forwarder, metric, tags, count, timestamp);
        self.finish_write(metric, result)
    }

    /// Writes a batch of values.
    ///
    /// `count` is the statistical weight of the batch. When it is zero, or equal to the number of values, it is not
    /// sent and the aggregator uses the number of values instead.
    ///
    /// Long batches are split across datagrams. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderTooLarge`] if not even a single value fits into a datagram alongside the header; nothing
    /// is buffered in that case. Returns [`Error::ConnectFailed`] or [`Error::WriteFailed`] if a flush triggered by this
    /// write fails.
    pub fn write_value(
        &mut self,
        metric: &str,
        tags: &Tags<'_>,
        values: &[f64],
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), Error> {
        let result = self.writer.write_values(&mut self.forwarder, metric, tags, values, count, timestamp);
        self.finish_write(metric, result)
    }

    /// Writes a batch of unique values.
    ///
    /// Behaves like [`write_value`](StatsHouseClient::write_value).
    ///
    /// # Errors
    ///
    /// Same as [`write_value`](StatsHouseClient::write_value).
    pub fn write_unique(
        &mut self,
        metric: &str,
        tags: &Tags<'_>,
        uniques: &[u64],
        count: f64,
        timestamp: Option<u32>,
    ) -> Result<(), Error> {
        let result = self.writer.write_uniques(&mut self.forwarder, metric, tags, uniques, count, timestamp);
        self.finish_write(metric, result)
    }

    /// Sends everything buffered right away, keeping the connection open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectFailed`] or [`Error::WriteFailed`], labeled `flush`, if sending fails.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.forwarder.flush(false).map_err(|e| Error::from_flush(FLUSH_LABEL, e))
    }

    /// Sends everything buffered and closes the connection.
    ///
    /// The client remains usable, but from now on every write is sent and the connection closed immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectFailed`] or [`Error::WriteFailed`], labeled `deferred`, if sending fails.
    pub fn close(&mut self) -> Result<(), Error> {
        self.forwarder.close().map_err(|e| Error::from_flush(DEFERRED_FLUSH_LABEL, e))
    }

    fn finish_write(&mut self, metric: &str, result: Result<(), PackError>) -> Result<(), Error> {
        let max_payload_len = self.writer.max_payload_len();
        result.map_err(|e| Error::from_pack(metric, max_payload_len, e))?;

        self.forwarder.maybe_flush().map_err(|e| Error::from_flush(metric, e))
    }
}

impl<T: Transport> Drop for StatsHouseClient<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Final flush failed; buffered metrics were dropped.");
        }
    }
}
