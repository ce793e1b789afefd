use super::events::{StoreEvent, SubscriptionId};
use super::ids::TurnId;
use super::turn::{ChatTurn, Role, TurnPatch};

/// Conversation-wide lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationStatus {
    #[default]
    Idle,
    Sending,
    Streaming,
    Error,
}

impl ConversationStatus {
    /// Returns true when a new submission may start.
    pub fn accepts_submission(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Error => "error",
        }
    }
}

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// Single source of truth for the turns of one conversation.
///
/// The store tracks the streaming target separately from the turn list and
/// keeps `is_streaming` set on that turn only. Every operation either
/// completes its state change or, for unknown ids and missing targets, does
/// nothing at all. Observers run synchronously after each change.
#[derive(Default)]
pub struct ConversationStore {
    turns: Vec<ChatTurn>,
    status: ConversationStatus,
    streaming_target: Option<TurnId>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn turn(&self, id: TurnId) -> Option<&ChatTurn> {
        self.turns.iter().find(|turn| turn.id == id)
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn streaming_target(&self) -> Option<TurnId> {
        self.streaming_target
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.status == ConversationStatus::Streaming
    }

    pub fn last_turn(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// Role and content of every turn, in order.
    pub fn history(&self) -> Vec<(Role, String)> {
        self.turns
            .iter()
            .map(|turn| (turn.role, turn.content.clone()))
            .collect()
    }

    pub fn add_turn(&mut self, role: Role, content: impl Into<String>) -> ChatTurn {
        self.push_turn(ChatTurn::new(role, content, false))
    }

    /// Adds a turn and makes it the streaming target in one step.
    pub fn add_streaming_turn(&mut self, role: Role, content: impl Into<String>) -> ChatTurn {
        let turn = ChatTurn::new(role, content, false);
        let id = turn.id;
        let created = self.push_turn(turn);
        if self.begin_streaming(id) {
            return self.turn(id).cloned().unwrap_or(created);
        }
        created
    }

    fn push_turn(&mut self, turn: ChatTurn) -> ChatTurn {
        let id = turn.id;
        self.turns.push(turn.clone());
        tracing::debug!(turn_id = %id, role = turn.role.label(), "turn added");
        self.notify(StoreEvent::TurnAdded {
            id,
            count: self.turns.len(),
        });
        turn
    }

    /// Merges `patch` into the turn with `id`. Returns false and changes
    /// nothing when no turn matches.
    ///
    /// `is_streaming` can only be changed through the streaming operations;
    /// a patch value that disagrees with the tracked target is ignored.
    pub fn update_turn(&mut self, id: TurnId, mut patch: TurnPatch) -> bool {
        let is_target = self.streaming_target == Some(id);
        let Some(turn) = self.turns.iter_mut().find(|turn| turn.id == id) else {
            tracing::debug!(turn_id = %id, "update for unknown turn ignored");
            return false;
        };

        if patch.is_streaming.is_some_and(|flag| flag != is_target) {
            tracing::warn!(turn_id = %id, "ignoring streaming flag change outside stream lifecycle");
            patch.is_streaming = None;
        }
        if patch.is_empty() {
            return true;
        }

        turn.apply(patch);
        self.notify(StoreEvent::TurnUpdated { id });
        true
    }

    /// Makes `id` the streaming target and moves status to Streaming.
    /// Unknown ids change nothing.
    pub fn begin_streaming(&mut self, id: TurnId) -> bool {
        if self.turn(id).is_none() {
            tracing::debug!(turn_id = %id, "begin streaming for unknown turn ignored");
            return false;
        }

        if let Some(prior) = self.streaming_target.filter(|prior| *prior != id) {
            if self.set_streaming_flag(prior, false) {
                self.notify(StoreEvent::TurnUpdated { id: prior });
            }
        }

        self.streaming_target = Some(id);
        self.set_streaming_flag(id, true);
        self.notify(StoreEvent::StreamStarted { id });
        self.set_status(ConversationStatus::Streaming);
        true
    }

    /// Replaces the target's content with the accumulated text so far.
    pub fn append_streamed_content(&mut self, full_content: impl Into<String>) {
        let Some(id) = self.streaming_target else {
            return;
        };
        let Some(turn) = self.turns.iter_mut().find(|turn| turn.id == id) else {
            return;
        };

        turn.content = full_content.into();
        self.notify(StoreEvent::ContentStreamed { id });
    }

    pub fn end_streaming(&mut self) {
        if let Some(id) = self.streaming_target.take() {
            self.set_streaming_flag(id, false);
            self.notify(StoreEvent::StreamEnded { id });
        }
        self.set_status(ConversationStatus::Idle);
    }

    /// Records `message` on the target turn and moves status to Error.
    pub fn fail_streaming(&mut self, message: impl Into<String>) {
        let message = message.into();
        if let Some(id) = self.streaming_target.take() {
            if let Some(turn) = self.turns.iter_mut().find(|turn| turn.id == id) {
                turn.is_streaming = false;
                turn.error = Some(message.clone());
            }
            tracing::debug!(turn_id = %id, error = %message, "stream failed");
            self.notify(StoreEvent::StreamFailed { id, message });
        }
        self.set_status(ConversationStatus::Error);
    }

    /// Moves from Idle or Error to Sending. Returns false while a request is
    /// already in flight.
    pub fn mark_sending(&mut self) -> bool {
        if !self.status.accepts_submission() {
            return false;
        }
        self.set_status(ConversationStatus::Sending);
        true
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.streaming_target = None;
        self.status = ConversationStatus::Idle;
        self.notify(StoreEvent::Reset);
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(subscription, _)| *subscription != id);
        self.observers.len() != before
    }

    fn set_streaming_flag(&mut self, id: TurnId, is_streaming: bool) -> bool {
        match self.turns.iter_mut().find(|turn| turn.id == id) {
            Some(turn) if turn.is_streaming != is_streaming => {
                turn.is_streaming = is_streaming;
                true
            }
            _ => false,
        }
    }

    fn set_status(&mut self, status: ConversationStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.notify(StoreEvent::StatusChanged { status });
    }

    fn notify(&mut self, event: StoreEvent) {
        for (_, observer) in &mut self.observers {
            observer(&event);
        }
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConversationStore")
            .field("turns", &self.turns)
            .field("status", &self.status)
            .field("streaming_target", &self.streaming_target)
            .field("observers", &self.observers.len())
            .finish()
    }
}
