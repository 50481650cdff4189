use std::sync::Arc;

use encoding_rs::{Decoder, UTF_8};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::protocol::{OutputStream, ServerEvent};
use crate::session::registry::SessionRegistry;

const READ_BUFFER_SIZE: usize = 8192;

/// Streaming UTF-8 decoder.
///
/// An incomplete trailing sequence is carried to the next chunk instead of
/// being replaced, so a character split across two reads survives intact.
/// Truly malformed bytes become U+FFFD.
pub struct Utf8Decoder {
    decoder: Decoder,
}

impl Default for Utf8Decoder {
    fn default() -> Self {
        Self {
            decoder: UTF_8.new_decoder_without_bom_handling(),
        }
    }
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, input: &[u8]) -> String {
        self.decode_inner(input, false)
    }

    /// Flush pending bytes at end of stream.
    pub fn finish(&mut self) -> String {
        self.decode_inner(&[], true)
    }

    fn decode_inner(&mut self, input: &[u8], last: bool) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(input.len())
            .unwrap_or(input.len() * 3 + 4);
        let mut out = String::with_capacity(capacity);
        let (_result, _read, had_replacements) = self.decoder.decode_to_string(input, &mut out, last);
        if had_replacements {
            debug!(event = "server.session.output_malformed_utf8");
        }
        out
    }
}

/// Spawn a task that forwards one pipe of a session to its bound connection.
///
/// Chunks are emitted in read order; the task ends at EOF or on read error.
pub fn spawn_output_reader<R>(
    registry: Arc<SessionRegistry>,
    session_id: String,
    stream: OutputStream,
    mut reader: R,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Decoder::new();

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = decoder.decode(&buf[..n]);
                    if !chunk.is_empty() {
                        registry.emit(
                            &session_id,
                            ServerEvent::Output {
                                session_id: session_id.clone(),
                                stream,
                                chunk,
                            },
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        event = "server.session.output_read_failed",
                        session_id = %session_id,
                        stream = stream.as_str(),
                        error = %e,
                    );
                    break;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            registry.emit(
                &session_id,
                ServerEvent::Output {
                    session_id: session_id.clone(),
                    stream,
                    chunk: tail,
                },
            );
        }

        debug!(
            event = "server.session.output_reader_exited",
            session_id = %session_id,
            stream = stream.as_str(),
        );
    })
}
