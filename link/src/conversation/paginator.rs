use std::sync::Arc;

use super::SharedConversation;
use crate::error::Result;
use crate::events::{ClientEvent, EventSink};
use crate::history::HistoryFetcher;
use crate::models::PageRequest;

/// Messages requested per history page.
pub const PAGE_SIZE: u32 = 30;

/// Outcome of one successful [`load_older`](crate::Conversation::load_older).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageResult {
    /// Messages in the server's page.
    pub fetched: usize,
    /// Messages actually added to the view (duplicates are skipped).
    pub appended: usize,
    /// Whether the server reported more pages.
    pub has_more: bool,
    /// The page number that was fetched.
    pub page_num: u32,
}

/// Backward history loader for one conversation at a time.
pub(crate) struct Paginator {
    fetcher: Arc<dyn HistoryFetcher>,
    page_size: u32,
    events: EventSink,
}

impl Paginator {
    pub(crate) fn new(fetcher: Arc<dyn HistoryFetcher>, events: EventSink) -> Self {
        Self {
            fetcher,
            page_size: PAGE_SIZE,
            events,
        }
    }

    /// Fetch the next older page and append it to the view.
    ///
    /// Returns `Ok(None)` without fetching while another load for the same
    /// conversation is in flight, and also when the conversation was closed
    /// before the page came back (the page is discarded). On error the
    /// cursor and `has_more` are left as they were. Dropping the returned
    /// future abandons the fetch and clears the in-flight flag.
    pub(crate) async fn load_older(&self, state: &SharedConversation) -> Result<Option<PageResult>> {
        let (chat_id, request) = {
            let mut st = state.lock();
            if st.loading {
                log::debug!("[chat-link] History load for chat {} already in flight", st.chat_id());
                return Ok(None);
            }
            st.loading = true;
            let request = PageRequest {
                page_size: self.page_size,
                page_num: st.view.page_num(),
                before: st.view.before(),
            };
            (st.chat_id(), request)
        };
        let mut in_flight = InFlight {
            state,
            settled: false,
        };

        let fetched = self.fetcher.fetch_page(chat_id, request).await;

        let result = {
            let mut st = state.lock();
            st.loading = false;
            in_flight.settled = true;
            if st.closed {
                log::debug!(
                    "[chat-link] Discarding page {} for closed chat {}",
                    request.page_num,
                    chat_id
                );
                return Ok(None);
            }
            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    log::warn!(
                        "[chat-link] History page {} for chat {} failed: {}",
                        request.page_num,
                        chat_id,
                        e
                    );
                    return Err(e);
                },
            };
            let fetched = page.content.len();
            let appended = st.view.append_older(page.content);
            st.view.advance(page.has_next);
            PageResult {
                fetched,
                appended,
                has_more: page.has_next,
                page_num: request.page_num,
            }
        };

        self.events.emit(ClientEvent::ConversationUpdated { chat_id });
        Ok(Some(result))
    }
}

/// Clears `loading` when a load is dropped before its fetch settles.
struct InFlight<'a> {
    state: &'a SharedConversation,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.state.lock().loading = false;
        }
    }
}
