//! A client for sending metrics to a [StatsHouse][statshouse] aggregator.
//!
//! [statshouse]: https://github.com/VKCOM/statshouse
//!
//! # Usage
//!
//! Build a client and write to it directly:
//!
//! ```no_run
//! # use metrics_exporter_statshouse::{StatsHouseBuilder, Tags};
//! let mut client = StatsHouseBuilder::default()
//!     .with_remote_address("127.0.0.1:13337")
//!     .expect("failed to parse remote address")
//!     .build()
//!     .expect("failed to build client");
//!
//! let tags = Tags::from(&[("method", "GET"), ("status", "200")][..]);
//! client.write_count("requests", &tags, 1.0, None).expect("failed to write counter");
//! client.write_value("latency", &tags, &[0.012, 0.018], 0.0, None).expect("failed to write values");
//!
//! // Send whatever is still buffered before exiting.
//! client.close().expect("failed to flush");
//! ```
//!
//! Or install it as the global [`metrics`] recorder:
//!
//! ```no_run
//! # use metrics_exporter_statshouse::StatsHouseBuilder;
//! let handle = StatsHouseBuilder::default().install().expect("failed to install recorder");
//!
//! metrics::counter!("requests", "method" => "GET").increment(1);
//! metrics::histogram!("latency").record(0.012);
//!
//! // The installed recorder is never dropped, so close it through the handle.
//! handle.close().expect("failed to flush");
//! ```
//!
//! # Batching
//!
//! Records are encoded in the TL wire format and packed into UDP datagrams of at most 1232 bytes by default, which fits
//! the minimum IPv6 MTU. A datagram is sent once the oldest record in it has waited longer than the flush interval, or
//! earlier when the next record would not fit. Long value arrays are split across as many datagrams as needed; every
//! part repeats the metric name and tags and is a complete batch on its own.
//!
//! # Tags
//!
//! Tags are either positional, sent with keys `1`, `2`, and so on, or named. A named key made of an underscore followed
//! by a digit, like `_1`, is sent without the underscore so that it addresses the same tag as the positional form.
//!
//! # Missing
//!
//! ## Asynchronous backend
//!
//! Writes and flushes happen on the caller's thread. There is no background flushing; a batch whose window has expired
//! is sent by the next write, or by an explicit [`StatsHouseClient::flush`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, StatsHouseBuilder};

mod client;
pub use self::client::StatsHouseClient;

pub mod codec;

mod error;
pub use self::error::Error;

mod forwarder;
pub use self::forwarder::{Transport, UdpTransport};

mod header;
pub use self::header::{build_header, FieldsMask, TagKey, Tags, BATCH_TAG};

mod lex;
pub use self::lex::{lex_dec_float, lex_enc_float};

mod recorder;
pub use self::recorder::{StatsHouseHandle, StatsHouseRecorder};

#[cfg(test)]
mod test_util;

mod writer;
pub use self::writer::{LEN_FIELD_SIZE, MAX_PAYLOAD_SIZE, MIN_PAYLOAD_LEN};
