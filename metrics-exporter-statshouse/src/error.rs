use std::io;

use thiserror::Error;

use crate::writer::{FlushError, PackError};

/// Errors returned by [`StatsHouseClient`](crate::StatsHouseClient) operations.
///
/// Every error carries the name of the metric being written when it happened. Flushes that are not part of a write
/// are labeled `flush`, and the final flush performed by `close` is labeled `deferred`.
#[derive(Debug, Error)]
pub enum Error {
    /// The record header does not fit into a single datagram even when nothing else is buffered.
    ///
    /// Shorten the metric name or the tags.
    #[error("{metric}: header of {header_len} bytes does not fit into a {max_payload_len}-byte datagram")]
    HeaderTooLarge {
        /// Metric name.
        metric: String,

        /// Encoded length of the header.
        header_len: usize,

        /// Configured maximum payload length.
        max_payload_len: usize,
    },

    /// The connection to the aggregator could not be established.
    ///
    /// It is retried on the next flush.
    #[error("{metric}: failed to connect to aggregator: {source}")]
    ConnectFailed {
        /// Metric name.
        metric: String,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The buffered payload could not be sent.
    ///
    /// The payload stays buffered and is retried on the next flush.
    #[error("{metric}: failed to send payload: {source}")]
    WriteFailed {
        /// Metric name.
        metric: String,

        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Returns the metric name, or flush label, this error is attached to.
    pub fn metric(&self) -> &str {
        match self {
            Error::HeaderTooLarge { metric, .. }
            | Error::ConnectFailed { metric, .. }
            | Error::WriteFailed { metric, .. } => metric,
        }
    }

    pub(crate) fn from_flush(metric: &str, e: FlushError) -> Self {
        let metric = metric.to_string();
        match e {
            FlushError::Connect(source) => Error::ConnectFailed { metric, source },
            FlushError::Write(source) => Error::WriteFailed { metric, source },
        }
    }

    pub(crate) fn from_pack(metric: &str, max_payload_len: usize, e: PackError) -> Self {
        match e {
            PackError::HeaderTooLarge { header_len } => {
                Error::HeaderTooLarge { metric: metric.to_string(), header_len, max_payload_len }
            }
            PackError::Flush(e) => Error::from_flush(metric, e),
        }
    }
}
