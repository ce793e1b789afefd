use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::rc::Rc;

use colored::{ColoredString, Colorize};
use ngmentor_chat::{ChatTurn, ConversationStore, Role, StoreEvent, SubscriptionId, TurnId};

/// Terminal rendering of the conversation.
///
/// The view subscribes to the store and queues its events; `render` drains
/// the queue after each controller step and prints only what is new, so a
/// streamed answer appears as an ever-growing line that stays at the bottom
/// of the terminal.
pub struct TranscriptView {
    queue: Rc<RefCell<VecDeque<StoreEvent>>>,
    subscription: SubscriptionId,
    printed: HashMap<TurnId, usize>,
    color: bool,
}

impl TranscriptView {
    pub fn attach(store: &mut ConversationStore, color: bool) -> Self {
        let queue = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&queue);
        let subscription = store.subscribe(move |event| sink.borrow_mut().push_back(event.clone()));

        Self {
            queue,
            subscription,
            printed: HashMap::new(),
            color,
        }
    }

    pub fn detach(self, store: &mut ConversationStore) {
        store.unsubscribe(self.subscription);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Writes everything that changed since the last call.
    pub fn render(&mut self, store: &ConversationStore, out: &mut impl Write) -> io::Result<()> {
        loop {
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            self.render_event(&event, store, out)?;
        }
        out.flush()
    }

    fn render_event(
        &mut self,
        event: &StoreEvent,
        store: &ConversationStore,
        out: &mut impl Write,
    ) -> io::Result<()> {
        match event {
            StoreEvent::TurnAdded { id, .. } => {
                let Some(turn) = store.turn(*id) else {
                    return Ok(());
                };
                writeln!(out, "{}", self.header(turn))?;
                if !turn.content.is_empty() {
                    write!(out, "{}", turn.content)?;
                }
                self.printed.insert(*id, turn.content.len());
                if turn.role != Role::Assistant {
                    writeln!(out)?;
                    writeln!(out)?;
                }
            }
            StoreEvent::ContentStreamed { id } => {
                let Some(turn) = store.turn(*id) else {
                    return Ok(());
                };
                let printed = self.printed.get(id).copied().unwrap_or(0);
                match turn.content.get(printed..) {
                    Some(suffix) => write!(out, "{suffix}")?,
                    // Content was rewritten rather than extended: print it again.
                    _ => write!(out, "\n{}", turn.content)?,
                }
                self.printed.insert(*id, turn.content.len());
            }
            StoreEvent::StreamEnded { id } => {
                self.printed.remove(id);
                writeln!(out)?;
                writeln!(out)?;
            }
            StoreEvent::StreamFailed { id, message } => {
                self.printed.remove(id);
                writeln!(out)?;
                writeln!(out, "{}", self.paint(&format!("✗ {message}"), |text| text.red()))?;
                writeln!(out)?;
            }
            StoreEvent::Reset => {
                self.printed.clear();
                writeln!(
                    out,
                    "{}",
                    self.paint("── conversation cleared ──", |text| text.bright_black())
                )?;
                writeln!(out)?;
            }
            StoreEvent::TurnUpdated { .. }
            | StoreEvent::StreamStarted { .. }
            | StoreEvent::StatusChanged { .. } => {}
        }
        Ok(())
    }

    fn header(&self, turn: &ChatTurn) -> String {
        match turn.role {
            Role::User => self.paint("you", |text| text.green().bold()),
            Role::Assistant => self.paint("mentor", |text| text.bright_blue().bold()),
            Role::System => self.paint("system", |text| text.bright_black().bold()),
        }
    }

    pub fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(view: &mut TranscriptView, store: &ConversationStore) -> String {
        let mut out = Vec::new();
        view.render(store, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn streamed_content_prints_only_new_suffix() {
        let mut store = ConversationStore::new();
        let mut view = TranscriptView::attach(&mut store, false);

        store.add_turn(Role::User, "hi");
        let answer = store.add_streaming_turn(Role::Assistant, "");
        assert_eq!(rendered(&mut view, &store), "you\nhi\n\nmentor\n");

        store.append_streamed_content("Hel");
        assert_eq!(rendered(&mut view, &store), "Hel");

        store.append_streamed_content("Hello");
        store.append_streamed_content("Hello, world");
        assert_eq!(rendered(&mut view, &store), "lo, world");

        store.end_streaming();
        assert_eq!(rendered(&mut view, &store), "\n\n");
        assert_eq!(store.turn(answer.id).unwrap().content, "Hello, world");
    }

    #[test]
    fn failure_prints_error_line() {
        let mut store = ConversationStore::new();
        let mut view = TranscriptView::attach(&mut store, false);

        store.add_streaming_turn(Role::Assistant, "");
        store.append_streamed_content("part");
        store.fail_streaming("request cancelled");

        assert_eq!(
            rendered(&mut view, &store),
            "mentor\npart\n✗ request cancelled\n\n"
        );
    }

    #[test]
    fn reset_is_announced() {
        let mut store = ConversationStore::new();
        let mut view = TranscriptView::attach(&mut store, false);
        store.add_turn(Role::User, "q");
        let _ = rendered(&mut view, &store);

        store.reset();
        assert_eq!(rendered(&mut view, &store), "── conversation cleared ──\n\n");
    }

    #[test]
    fn rewritten_content_is_printed_whole() {
        let mut store = ConversationStore::new();
        let mut view = TranscriptView::attach(&mut store, false);
        store.add_streaming_turn(Role::Assistant, "");
        store.append_streamed_content("long text");
        let _ = rendered(&mut view, &store);

        store.append_streamed_content("short");
        assert_eq!(rendered(&mut view, &store), "\nshort");
    }

    #[test]
    fn detached_view_stops_queueing() {
        let mut store = ConversationStore::new();
        let view = TranscriptView::attach(&mut store, false);
        let queue = Rc::clone(&view.queue);
        view.detach(&mut store);

        store.add_turn(Role::User, "q");
        assert!(queue.borrow().is_empty());
    }
}
