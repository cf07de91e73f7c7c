//! Conversation session: owns the transcript, the active run-id, and the
//! send/receive cycle.
//!
//! The session is UI-free. A front end renders `transcript()` and calls
//! `send`/`new_chat`; everything else (identity bootstrap, history
//! restore, marker demultiplexing, identifier persistence) happens here.

mod identity;
mod models;
mod store;

pub use identity::{EnvIdentity, IdentityProvider, random_suffix, resolve_user_id};
pub use models::{HistoryTurn, Message, Sender};
pub use store::{FileStore, MemoryStore, RUN_ID_KEY, StateStore, USER_ID_KEY};

use anyhow::Result;
use futures::StreamExt;
use log::{debug, error, warn};

use crate::stream::ChunkDemux;
use crate::transport::ChatTransport;

/// Greeting for a brand-new conversation.
pub const GREETING: &str = "สวัสดีครับ มีอะไรให้ผมช่วยไหมครับ?";
/// Greeting when a stored run had no prior turns.
pub const GREETING_RESUMED: &str = "สวัสดีครับ เริ่มต้นการสนทนาใหม่ได้เลยครับ";
/// Greeting when history could not be fetched.
pub const GREETING_HISTORY_UNAVAILABLE: &str = "สวัสดีครับ (ไม่สามารถดึงประวัติเก่าได้)";
/// Notice shown after starting a fresh topic.
pub const NEW_TOPIC_NOTICE: &str = "เริ่มหัวข้อใหม่แล้วครับ";
/// Text replacing an in-flight reply that failed.
pub const FAILURE_NOTICE: &str = "ขออภัย ระบบเกิดข้อขัดข้อง";
/// Dismissible banner text for a failed send.
pub const ERROR_BANNER: &str = "เกิดข้อผิดพลาดในการเชื่อมต่อ";

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Idle,
    Sending,
}

/// A chat session against one transport and one persistence store.
pub struct ChatSession<T: ChatTransport, S: StateStore> {
    transport: T,
    store: S,
    node_id: String,
    /// Wire-level user id override (the shared-access token the upstream
    /// expects); the locally persisted identity still names run-ids.
    share_user: Option<String>,
    user_id: String,
    run_id: String,
    state: SessionState,
    /// Bumped on every send and every new-chat; chunks carrying an older
    /// generation are dropped instead of mutating a superseded reply.
    generation: u64,
    transcript: Vec<Message>,
    demux: Option<ChunkDemux>,
    last_error: Option<String>,
}

impl<T: ChatTransport, S: StateStore> ChatSession<T, S> {
    pub fn new(transport: T, store: S, node_id: impl Into<String>) -> Self {
        Self {
            transport,
            store,
            node_id: node_id.into(),
            share_user: None,
            user_id: String::new(),
            run_id: String::new(),
            state: SessionState::Uninitialized,
            generation: 0,
            transcript: Vec::new(),
            demux: None,
            last_error: None,
        }
    }

    /// Use a fixed wire-level user id (e.g. `__share__`) toward the API
    /// instead of the locally resolved identity.
    pub fn with_share_user(mut self, share_user: impl Into<String>) -> Self {
        self.share_user = Some(share_user.into());
        self
    }

    /// Resolve identity, restore or start a run, and enter `Idle`.
    pub async fn bootstrap(&mut self, providers: &[Box<dyn IdentityProvider>]) -> Result<()> {
        self.user_id = resolve_user_id(providers, &mut self.store).await?;

        match self.store.get(RUN_ID_KEY) {
            Some(stored) => {
                self.run_id = stored;
                self.restore_history().await;
            }
            None => {
                self.run_id = generate_run_id(&self.user_id);
                self.store.set(RUN_ID_KEY, &self.run_id)?;
                self.transcript = vec![Message::assistant(GREETING)];
            }
        }

        self.state = SessionState::Idle;
        Ok(())
    }

    /// Send a prompt and stream the reply into the transcript.
    ///
    /// Empty prompts and sends while another is in flight are silent
    /// no-ops. The session always returns to `Idle`, success or failure.
    pub async fn send(&mut self, prompt: &str) {
        self.send_with(prompt, |_| {}).await;
    }

    /// Like [`send`](Self::send), invoking `on_update` with the full
    /// accumulated reply text after each processed chunk.
    pub async fn send_with<F: FnMut(&str)>(&mut self, prompt: &str, mut on_update: F) {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() || self.state != SessionState::Idle {
            debug!("send ignored (state: {:?})", self.state);
            return;
        }

        self.last_error = None;
        self.transcript.push(Message::user(prompt.clone()));
        self.transcript.push(Message::assistant(""));
        self.state = SessionState::Sending;
        self.generation += 1;
        let generation = self.generation;

        if let Err(err) = self.stream_reply(generation, &prompt, &mut on_update).await {
            error!("chat send failed: {err:#}");
            self.last_error = Some(ERROR_BANNER.to_string());
            if generation == self.generation {
                self.set_reply_text(FAILURE_NOTICE.to_string());
            }
        }

        self.demux = None;
        self.state = SessionState::Idle;
    }

    /// Start a fresh conversation thread: new run-id, transcript reset to
    /// a single notice. Any still-arriving chunks of a previous stream
    /// are superseded by the generation bump.
    pub fn new_chat(&mut self) -> Result<()> {
        self.generation += 1;
        self.run_id = generate_run_id(&self.user_id);
        self.store.set(RUN_ID_KEY, &self.run_id)?;
        self.transcript = vec![Message::assistant(NEW_TOPIC_NOTICE)];
        self.demux = None;
        self.last_error = None;
        self.state = SessionState::Idle;
        Ok(())
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The last send's user-visible error, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    async fn stream_reply<F: FnMut(&str)>(
        &mut self,
        generation: u64,
        prompt: &str,
        on_update: &mut F,
    ) -> Result<()> {
        let wire_user = self.wire_user_id().to_string();
        let mut stream = self
            .transport
            .send_prompt(prompt, &wire_user, &self.node_id, &self.run_id)
            .await?;

        self.demux = Some(ChunkDemux::new(self.run_id.clone()));

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            self.apply_chunk(generation, &bytes);
            if let Some(text) = self.reply_text(generation) {
                let text = text.to_string();
                on_update(&text);
            }
        }

        // Flush any partial scalar the decoder is still holding.
        if generation == self.generation {
            if let Some(demux) = self.demux.as_mut() {
                let before = demux.text().len();
                let update = demux.finish();
                let changed = update.text.len() != before;
                self.set_reply_text(update.text);
                if changed {
                    if let Some(text) = self.reply_text(generation) {
                        let text = text.to_string();
                        on_update(&text);
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply one chunk of response bytes. Chunks from a superseded
    /// generation are dropped rather than mutating newer state.
    fn apply_chunk(&mut self, generation: u64, bytes: &[u8]) {
        if generation != self.generation {
            debug!("dropping stale chunk from generation {generation}");
            return;
        }
        let Some(demux) = self.demux.as_mut() else {
            return;
        };

        let update = demux.process_chunk(bytes);

        if let Some(new_run_id) = update.run_id_update {
            debug!("adopting run-id {new_run_id}");
            self.run_id = new_run_id;
            if let Err(err) = self.store.set(RUN_ID_KEY, &self.run_id) {
                warn!("failed to persist run-id: {err:#}");
            }
        }

        self.set_reply_text(update.text);
    }

    /// Replace the in-flight assistant message with the accumulated text.
    fn set_reply_text(&mut self, text: String) {
        if let Some(last) = self.transcript.last_mut() {
            if last.sender == Sender::Assistant {
                last.text = text;
            }
        }
    }

    fn reply_text(&self, generation: u64) -> Option<&str> {
        if generation != self.generation {
            return None;
        }
        match self.transcript.last() {
            Some(message) if message.sender == Sender::Assistant => Some(&message.text),
            _ => None,
        }
    }

    fn wire_user_id(&self) -> &str {
        self.share_user.as_deref().unwrap_or(&self.user_id)
    }

    async fn restore_history(&mut self) {
        let wire_user = self.wire_user_id().to_string();
        match self
            .transport
            .fetch_history(&wire_user, &self.node_id, &self.run_id)
            .await
        {
            Ok(turns) => {
                let mut messages = Vec::new();
                for turn in turns {
                    if !turn.input.is_empty() {
                        messages.push(Message::user(turn.input));
                    }
                    if !turn.output.is_empty() {
                        messages.push(Message::assistant(turn.output));
                    }
                }
                self.transcript = if messages.is_empty() {
                    vec![Message::assistant(GREETING_RESUMED)]
                } else {
                    messages
                };
            }
            Err(err) => {
                warn!("history restore failed: {err:#}");
                self.transcript = vec![Message::assistant(GREETING_HISTORY_UNAVAILABLE)];
            }
        }
    }

    #[cfg(test)]
    fn begin_test_stream(&mut self) -> u64 {
        self.transcript.push(Message::assistant(""));
        self.state = SessionState::Sending;
        self.generation += 1;
        self.demux = Some(ChunkDemux::new(self.run_id.clone()));
        self.generation
    }
}

/// Run-id for a new conversation thread: `{user}_liff_{8 base36 chars}`.
fn generate_run_id(user_id: &str) -> String {
    let suffix = random_suffix(8);
    if user_id.is_empty() {
        format!("liff_{suffix}")
    } else {
        format!("{user_id}_liff_{suffix}")
    }
}
