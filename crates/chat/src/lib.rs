//! In-memory conversation state: turns, the streaming target and the
//! conversation status, with synchronous change notification.

mod events;
mod ids;
mod store;
mod turn;

pub use events::{StoreEvent, SubscriptionId};
pub use ids::TurnId;
pub use store::{ConversationStatus, ConversationStore};
pub use turn::{ChatTurn, Role, TurnPatch};
