use std::collections::HashSet;

use crate::models::Message;

/// Messages of one open conversation plus its pagination cursor.
///
/// Messages are ordered newest-first and ids are unique. The `before`
/// cursor is fixed when the view is created, so live messages that arrive
/// later never shift the pages being fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConversationView {
    chat_id: i64,
    messages: Vec<Message>,
    page_num: u32,
    before: i64,
    has_more: bool,
}

impl ConversationView {
    pub(crate) fn new(chat_id: i64, opened_at_ms: i64) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            page_num: 0,
            before: opened_at_ms,
            has_more: true,
        }
    }

    pub(crate) fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn page_num(&self) -> u32 {
        self.page_num
    }

    pub(crate) fn before(&self) -> i64 {
        self.before
    }

    pub(crate) fn has_more(&self) -> bool {
        self.has_more
    }

    pub(crate) fn contains_id(&self, id: i64) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// First free optimistic id at or below `candidate`.
    pub(crate) fn free_optimistic_id(&self, candidate: i64) -> i64 {
        let mut id = candidate.min(-1);
        while self.contains_id(id) {
            id -= 1;
        }
        id
    }

    pub(crate) fn insert_head(&mut self, message: Message) {
        self.messages.insert(0, message);
    }

    /// Swap the message with id `id` for `message`, keeping its position.
    pub(crate) fn replace(&mut self, id: i64, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(slot) => {
                *slot = message;
                true
            },
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: i64) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Append an older page at the tail, skipping ids already present.
    /// Returns how many messages were appended.
    pub(crate) fn append_older(&mut self, page: Vec<Message>) -> usize {
        let mut seen: HashSet<i64> = self.messages.iter().map(|m| m.id).collect();
        let before = self.messages.len();
        self.messages
            .extend(page.into_iter().filter(|m| seen.insert(m.id)));
        self.messages.len() - before
    }

    /// Record a successful page fetch.
    pub(crate) fn advance(&mut self, has_more: bool) {
        self.page_num += 1;
        self.has_more = has_more;
    }
}
