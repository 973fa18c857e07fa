#[cfg(test)]
mod data_channel_test;

use crate::error::{Error, Result};

use bytes::Bytes;
use sctp::chunk::chunk_payload_data::PayloadProtocolIdentifier;
use sctp::stream::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A negotiated DataChannel: the in- and outbound SCTP streams sharing one
/// stream identifier, treated as a bidirectional message channel. Both sides
/// agreed on the id up front, so there is no in-band open handshake.
pub struct DataChannel {
    stream: Arc<Stream>,
    closed: AtomicBool,
}

impl DataChannel {
    pub(crate) fn new(stream: Arc<Stream>) -> Arc<Self> {
        stream.set_default_payload_type(PayloadProtocolIdentifier::Binary);
        Arc::new(DataChannel {
            stream,
            closed: AtomicBool::new(false),
        })
    }

    /// The SCTP stream identifier both directions share.
    pub fn stream_identifier(&self) -> u16 {
        self.stream.stream_identifier()
    }

    /// Reads one message as binary data.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_data_channel(buf).await.map(|(n, _)| n)
    }

    /// Reads one message. Returns the number of bytes read and `true` if the
    /// peer flagged the message as a string.
    pub async fn read_data_channel(&self, buf: &mut [u8]) -> Result<(usize, bool)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrDataChannelClosed);
        }

        let (mut n, ppi) = match self.stream.read_sctp(buf).await {
            Ok((0, PayloadProtocolIdentifier::Unknown)) => {
                // stream reset by the peer, surface a clean end of stream
                self.close().await?;
                return Ok((0, false));
            }
            Ok((n, ppi)) => (n, ppi),
            Err(err) => {
                self.close().await?;
                return Err(err.into());
            }
        };

        let is_string = matches!(
            ppi,
            PayloadProtocolIdentifier::String | PayloadProtocolIdentifier::StringEmpty
        );
        // an empty message travels as one zero byte under the *Empty ppi
        if matches!(
            ppi,
            PayloadProtocolIdentifier::StringEmpty | PayloadProtocolIdentifier::BinaryEmpty
        ) {
            n = 0;
        }

        Ok((n, is_string))
    }

    /// Writes one binary message.
    pub async fn write(&self, data: &Bytes) -> Result<usize> {
        self.write_data_channel(data, false).await
    }

    /// Writes one text message.
    pub async fn write_text(&self, text: &str) -> Result<usize> {
        self.write_data_channel(&Bytes::copy_from_slice(text.as_bytes()), true)
            .await
    }

    /// Writes one message with the RFC 8831 payload identifier mapping.
    /// SCTP cannot carry empty user messages, so an empty message goes out
    /// as a single zero byte under the matching *Empty identifier.
    pub async fn write_data_channel(&self, data: &Bytes, is_string: bool) -> Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrDataChannelClosed);
        }
        let ppi = payload_identifier(is_string, data.len());

        if data.is_empty() {
            self.stream
                .write_sctp(&Bytes::from_static(&[0]), ppi)
                .await?;
            Ok(0)
        } else {
            Ok(self.stream.write_sctp(data, ppi).await?)
        }
    }

    /// Closes the channel by resetting the outgoing stream. Reads and writes
    /// after this return [`Error::ErrDataChannelClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stream.close().await?;
        Ok(())
    }
}

/// RFC 8831 6.6 payload identifier selection.
fn payload_identifier(is_string: bool, len: usize) -> PayloadProtocolIdentifier {
    match (is_string, len) {
        (false, 0) => PayloadProtocolIdentifier::BinaryEmpty,
        (false, _) => PayloadProtocolIdentifier::Binary,
        (true, 0) => PayloadProtocolIdentifier::StringEmpty,
        (true, _) => PayloadProtocolIdentifier::String,
    }
}
