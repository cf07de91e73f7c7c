//! Chunk demultiplexer: separates sideband markers from display text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Utf8Decoder;

// Value runs to the next whitespace, newline, or end of chunk. Only the
// first occurrence per chunk is honored; the upstream protocol emits the
// marker at most once per chunk.
static RUN_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[RUN_ID\]:(\S*)(?:\s|$)").expect("run-id marker regex"));
static USAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[USAGE\]:.*?\}\s*").expect("usage marker regex"));
static DONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[DONE\]\s*").expect("done marker regex"));

/// Result of feeding one chunk through the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpdate {
    /// The full accumulated message text so far, not just this chunk's
    /// contribution. Consumers replace their copy wholesale so a skipped
    /// render never loses text.
    pub text: String,
    /// Set when the chunk carried a run-id marker whose value differs
    /// from the currently active one.
    pub run_id_update: Option<String>,
}

/// Incremental demultiplexer for one in-flight response stream.
///
/// Bytes are decoded with a carry-over UTF-8 decoder, then three
/// extraction passes run in fixed order: run-id marker, usage marker,
/// done marker. Markers are stripped from the visible text; everything
/// else accumulates in wire order.
///
/// Markers split across a chunk boundary are not reassembled. The
/// upstream emits each marker within a single chunk in practice, and the
/// per-chunk design keeps processing idempotent and allocation-light.
#[derive(Debug)]
pub struct ChunkDemux {
    decoder: Utf8Decoder,
    accumulated: String,
    run_id: String,
}

impl ChunkDemux {
    pub fn new(active_run_id: impl Into<String>) -> Self {
        Self {
            decoder: Utf8Decoder::new(),
            accumulated: String::new(),
            run_id: active_run_id.into(),
        }
    }

    /// Process one chunk of raw bytes from the wire.
    pub fn process_chunk(&mut self, bytes: &[u8]) -> ChunkUpdate {
        let text = self.decoder.decode(bytes);
        self.process_text(&text)
    }

    /// Drain the decoder at end of stream and return the final state.
    pub fn finish(&mut self) -> ChunkUpdate {
        let tail = self.decoder.finish();
        self.process_text(&tail)
    }

    /// The accumulated visible text so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// The run-id this demux currently considers active.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn process_text(&mut self, text: &str) -> ChunkUpdate {
        let mut run_id_update = None;
        let mut clean = text.to_string();

        if let Some(caps) = RUN_ID_RE.captures(&clean) {
            let value = caps[1].trim().to_string();
            if !value.is_empty() {
                if value != self.run_id {
                    self.run_id = value.clone();
                    run_id_update = Some(value);
                }
                clean = RUN_ID_RE.replacen(&clean, 1, "").into_owned();
            }
        }
        if clean.contains("[USAGE]:") {
            clean = USAGE_RE.replace_all(&clean, "").into_owned();
        }
        if clean.contains("[DONE]") {
            clean = DONE_RE.replace_all(&clean, "").into_owned();
        }

        self.accumulated.push_str(&clean);

        ChunkUpdate {
            text: self.accumulated.clone(),
            run_id_update,
        }
    }
}
