//! JSON request source and response sinks
//!
//! The dispatcher consumes any iterator of `ServerResult<Request>` and
//! emits through a [`ResponseSink`]. In parallel mode several consumers
//! emit at once, so every sink serializes writes internally.

use crate::error::{ServerError, ServerResult};
use crate::request::{Request, Response};
use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer};
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for encoded responses
///
/// Implementations must be safe to call from several threads at once and
/// must not interleave the bytes of two responses.
pub trait ResponseSink: Send + Sync {
    fn emit(&self, response: &Response) -> ServerResult<()>;
}

/// Stream of requests decoded from concatenated JSON values
///
/// Values may be separated by any JSON whitespace. After the first decode
/// failure the source is exhausted: a broken stream is never resynced.
pub struct JsonSource<R: Read> {
    stream: StreamDeserializer<'static, IoRead<R>, Request>,
    failed: bool,
}

impl<R: Read> JsonSource<R> {
    /// Decode from `reader`; pass a buffered reader (e.g. `StdinLock`)
    pub fn new(reader: R) -> Self {
        Self {
            stream: Deserializer::from_reader(reader).into_iter(),
            failed: false,
        }
    }
}

impl<R: Read> Iterator for JsonSource<R> {
    type Item = ServerResult<Request>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.stream.next()? {
            Ok(request) => Some(Ok(request)),
            Err(e) => {
                self.failed = true;
                Some(Err(ServerError::Decode(e)))
            }
        }
    }
}

/// Writes one JSON object per line to `W`
pub struct JsonSink<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ResponseSink for JsonSink<W> {
    fn emit(&self, response: &Response) -> ServerResult<()> {
        // Encode outside the lock; only the write is serialized
        let mut line = serde_json::to_vec(response).map_err(ServerError::Encode)?;
        line.push(b'\n');

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(&line)?;
        out.flush()?;
        Ok(())
    }
}

/// Collects responses in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    responses: Mutex<Vec<Response>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far
    pub fn responses(&self) -> Vec<Response> {
        self.lock().clone()
    }

    /// Number of responses emitted so far
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Response>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponseSink for MemorySink {
    fn emit(&self, response: &Response) -> ServerResult<()> {
        self.lock().push(response.clone());
        Ok(())
    }
}
