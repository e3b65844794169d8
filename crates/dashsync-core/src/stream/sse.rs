use super::client::StreamError;

/// Default event type when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Longest line the decoder buffers while waiting for its newline.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub event: String,
    pub data: String,
    /// Last event id seen on the connection, if any.
    pub id: Option<String>,
}

impl StreamMessage {
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a line or a multi-byte
/// character; only complete lines are interpreted. A line that grows past
/// the limit without a newline is dropped along with its frame.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    data: Vec<String>,
    event: Option<String>,
    last_id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line: max_line.max(1),
            data: Vec::new(),
            event: None,
            last_id: None,
        }
    }

    /// Feed a chunk, returning every event it completes.
    ///
    /// Fails with [`StreamError::LineTooLong`] once the unterminated tail
    /// exceeds the line limit. The tail and the partial frame are discarded,
    /// so the decoder is usable again afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamMessage>, StreamError> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;
            self.scanned = start;
            if let Some(message) = self.process_line(&line) {
                out.push(message);
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            self.buffer.clear();
            self.scanned = 0;
            self.data.clear();
            self.event = None;
            return Err(StreamError::LineTooLong(self.max_line));
        }
        Ok(out)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(StreamMessage {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}
