/// Stream lifecycle driver between the store and the completion provider.
pub mod controller;
/// Line input and slash commands.
pub mod input;
pub mod transcript;

pub use controller::{ChatController, ControllerError, ControllerResult, STREAM_CLOSED_MESSAGE};
pub use input::{HELP_TEXT, InputCommand, MessageInput};
pub use transcript::TranscriptView;
