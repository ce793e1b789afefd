use super::ids::TurnId;
use super::store::ConversationStatus;

/// Change notification delivered to store observers after the state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TurnAdded { id: TurnId, count: usize },
    TurnUpdated { id: TurnId },
    StreamStarted { id: TurnId },
    ContentStreamed { id: TurnId },
    StreamEnded { id: TurnId },
    StreamFailed { id: TurnId, message: String },
    StatusChanged { status: ConversationStatus },
    Reset,
}

impl StoreEvent {
    /// The turn this event concerns, if any.
    pub fn turn_id(&self) -> Option<TurnId> {
        match self {
            Self::TurnAdded { id, .. }
            | Self::TurnUpdated { id }
            | Self::StreamStarted { id }
            | Self::ContentStreamed { id }
            | Self::StreamEnded { id }
            | Self::StreamFailed { id, .. } => Some(*id),
            Self::StatusChanged { .. } | Self::Reset => None,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);
