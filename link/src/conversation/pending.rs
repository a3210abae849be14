use std::collections::{HashMap, VecDeque};

/// One outbound message awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingSend {
    pub optimistic_id: i64,
    pub client_msg_id: String,
}

/// Outbound contents awaiting confirmation, keyed by the literal content.
///
/// Each key holds a FIFO so the same text sent twice is tracked twice; the
/// oldest record is confirmed first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PendingSends {
    by_content: HashMap<String, VecDeque<PendingSend>>,
}

impl PendingSends {
    pub(crate) fn push(&mut self, content: &str, pending: PendingSend) {
        self.by_content
            .entry(content.to_string())
            .or_default()
            .push_back(pending);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, content: &str) -> bool {
        self.by_content.contains_key(content)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_content.values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_content.is_empty()
    }

    /// Take the record carrying `client_msg_id`, wherever it is.
    pub(crate) fn take_by_token(&mut self, client_msg_id: &str) -> Option<PendingSend> {
        let content = self
            .by_content
            .iter()
            .find(|(_, queue)| queue.iter().any(|p| p.client_msg_id == client_msg_id))
            .map(|(content, _)| content.clone())?;
        self.take_where(&content, |p| p.client_msg_id == client_msg_id)
    }

    /// Take the oldest record for `content`.
    pub(crate) fn take_oldest(&mut self, content: &str) -> Option<PendingSend> {
        self.take_where(content, |_| true)
    }

    /// Drop the record for a specific optimistic message (rollback).
    pub(crate) fn remove(&mut self, content: &str, optimistic_id: i64) -> bool {
        self.take_where(content, |p| p.optimistic_id == optimistic_id)
            .is_some()
    }

    fn take_where(&mut self, content: &str, pred: impl Fn(&PendingSend) -> bool) -> Option<PendingSend> {
        let queue = self.by_content.get_mut(content)?;
        let index = queue.iter().position(pred)?;
        let taken = queue.remove(index);
        if queue.is_empty() {
            self.by_content.remove(content);
        }
        taken
    }
}
