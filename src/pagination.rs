use crate::v2ex::{Node, TopicSummary};

pub const REPLIES_PER_PAGE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Detail { topic_id: i64, page: u32 },
}

/// What a view transition wants fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRequest {
    TopicList(Node),
    TopicPage { topic_id: i64, page: u32 },
}

/// A fetch request tagged with the generation that issued it. Completions
/// from a superseded generation are discarded instead of overwriting newer
/// state.
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket {
    pub generation: u64,
    pub request: FetchRequest,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ListState<'a> {
    Topics(&'a [TopicSummary]),
    Empty,
}

/// Tracks whether the session is looking at a topic list or a topic page,
/// and turns user actions into fetch requests. Results are applied back via
/// `apply_*`, which reject stale generations.
pub struct Controller {
    view: View,
    node: Node,
    topics: Vec<TopicSummary>,
    total_replies: i64,
    generation: u64,
}

impl Controller {
    pub fn new(node: Node) -> Self {
        Self {
            view: View::List,
            node,
            topics: Vec::new(),
            total_replies: 0,
            generation: 0,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn topics(&self) -> &[TopicSummary] {
        &self.topics
    }

    pub fn total_replies(&self) -> i64 {
        self.total_replies
    }

    pub fn total_pages(&self) -> u32 {
        if self.total_replies <= 0 {
            return 0;
        }
        ((self.total_replies + REPLIES_PER_PAGE - 1) / REPLIES_PER_PAGE) as u32
    }

    fn issue(&mut self, request: FetchRequest) -> FetchTicket {
        self.generation += 1;
        FetchTicket {
            generation: self.generation,
            request,
        }
    }

    /// Switches node: back to the list view, previous list discarded.
    pub fn select_node(&mut self, node: Node) -> FetchTicket {
        self.node = node;
        self.view = View::List;
        self.topics.clear();
        self.issue(FetchRequest::TopicList(node))
    }

    /// Opens a topic. The page resets to 1 whenever the topic changes;
    /// re-selecting the topic already open keeps its page.
    pub fn select_topic(&mut self, topic_id: i64) -> FetchTicket {
        let page = match self.view {
            View::Detail {
                topic_id: current,
                page,
            } if current == topic_id => page,
            _ => 1,
        };
        self.view = View::Detail { topic_id, page };
        self.issue(FetchRequest::TopicPage { topic_id, page })
    }

    /// No-op unless in detail view with more replies beyond the current page.
    pub fn next_page(&mut self) -> Option<FetchTicket> {
        let View::Detail { topic_id, page } = self.view else {
            return None;
        };
        if i64::from(page) * REPLIES_PER_PAGE >= self.total_replies {
            return None;
        }
        let page = page + 1;
        self.view = View::Detail { topic_id, page };
        Some(self.issue(FetchRequest::TopicPage { topic_id, page }))
    }

    /// No-op unless in detail view past the first page.
    pub fn prev_page(&mut self) -> Option<FetchTicket> {
        let View::Detail { topic_id, page } = self.view else {
            return None;
        };
        if page <= 1 {
            return None;
        }
        let page = page - 1;
        self.view = View::Detail { topic_id, page };
        Some(self.issue(FetchRequest::TopicPage { topic_id, page }))
    }

    /// Returns to the list view without a network call, restoring the
    /// previously fetched topics. Any in-flight detail fetch is invalidated.
    pub fn back(&mut self) -> ListState<'_> {
        self.view = View::List;
        self.generation += 1;
        self.list_state()
    }

    pub fn list_state(&self) -> ListState<'_> {
        if self.topics.is_empty() {
            ListState::Empty
        } else {
            ListState::Topics(&self.topics)
        }
    }

    /// Re-runs the fetch for whatever the current view shows.
    pub fn refresh(&mut self) -> FetchTicket {
        match self.view {
            View::List => self.issue(FetchRequest::TopicList(self.node)),
            View::Detail { topic_id, page } => {
                self.issue(FetchRequest::TopicPage { topic_id, page })
            }
        }
    }

    /// Applies a completed list fetch. Returns false if the result belongs
    /// to a superseded request.
    pub fn apply_topic_list(&mut self, generation: u64, topics: Vec<TopicSummary>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.topics = topics;
        true
    }

    /// Applies a completed topic-page fetch, recording the reply total the
    /// pagination bounds derive from.
    pub fn apply_topic_page(&mut self, generation: u64, total_replies: i64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.total_replies = total_replies;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summaries(count: usize) -> Vec<TopicSummary> {
        (0..count)
            .map(|i| TopicSummary {
                id: i as i64 + 1,
                title: format!("topic {}", i + 1),
                replies: 0,
            })
            .collect()
    }

    fn controller_on_page(topic_id: i64, page: u32, total_replies: i64) -> Controller {
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_topic(topic_id);
        assert!(controller.apply_topic_page(ticket.generation, total_replies));
        let mut page_now = 1;
        while page_now < page {
            let ticket = controller.next_page().expect("page within bounds");
            assert!(controller.apply_topic_page(ticket.generation, total_replies));
            page_now += 1;
        }
        controller
    }

    #[test]
    fn total_pages_rounds_up() {
        let controller = controller_on_page(1, 1, 41);
        assert_eq!(controller.total_pages(), 3);
        let controller = controller_on_page(1, 1, 40);
        assert_eq!(controller.total_pages(), 2);
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_topic(1);
        controller.apply_topic_page(ticket.generation, 0);
        assert_eq!(controller.total_pages(), 0);
    }

    #[test]
    fn select_topic_starts_at_page_one() {
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_topic(10);
        assert_eq!(
            ticket.request,
            FetchRequest::TopicPage {
                topic_id: 10,
                page: 1
            }
        );
        assert_eq!(
            controller.view(),
            View::Detail {
                topic_id: 10,
                page: 1
            }
        );
    }

    #[test]
    fn selecting_a_different_topic_resets_the_page() {
        let mut controller = controller_on_page(10, 3, 100);
        let ticket = controller.select_topic(11);
        assert_eq!(
            ticket.request,
            FetchRequest::TopicPage {
                topic_id: 11,
                page: 1
            }
        );
    }

    #[test]
    fn reselecting_the_same_topic_keeps_the_page() {
        let mut controller = controller_on_page(10, 3, 100);
        let ticket = controller.select_topic(10);
        assert_eq!(
            ticket.request,
            FetchRequest::TopicPage {
                topic_id: 10,
                page: 3
            }
        );
    }

    #[test]
    fn next_page_is_bounded_by_total_replies() {
        // 40 replies: exactly two pages, page 2 is the last.
        let mut controller = controller_on_page(5, 2, 40);
        assert!(controller.next_page().is_none());

        // 41 replies: page 3 exists.
        let mut controller = controller_on_page(5, 2, 41);
        let ticket = controller.next_page().expect("third page");
        assert_eq!(
            ticket.request,
            FetchRequest::TopicPage {
                topic_id: 5,
                page: 3
            }
        );
    }

    #[test]
    fn prev_page_is_a_noop_on_page_one() {
        let mut controller = controller_on_page(5, 1, 100);
        assert!(controller.prev_page().is_none());
        let mut controller = controller_on_page(5, 2, 100);
        let ticket = controller.prev_page().expect("page one");
        assert_eq!(
            ticket.request,
            FetchRequest::TopicPage {
                topic_id: 5,
                page: 1
            }
        );
    }

    #[test]
    fn paging_is_a_noop_in_list_view() {
        let mut controller = Controller::new(Node::Hot);
        assert!(controller.next_page().is_none());
        assert!(controller.prev_page().is_none());
    }

    #[test]
    fn select_node_discards_the_previous_list() {
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_node(Node::Hot);
        assert!(controller.apply_topic_list(ticket.generation, summaries(3)));
        assert_eq!(controller.topics().len(), 3);

        let ticket = controller.select_node(Node::Tech);
        assert_eq!(ticket.request, FetchRequest::TopicList(Node::Tech));
        assert!(controller.topics().is_empty());
        assert_eq!(controller.node(), Node::Tech);
    }

    #[test]
    fn back_restores_the_cached_list_without_a_fetch() {
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_node(Node::Hot);
        controller.apply_topic_list(ticket.generation, summaries(2));
        controller.select_topic(1);

        match controller.back() {
            ListState::Topics(topics) => assert_eq!(topics.len(), 2),
            ListState::Empty => panic!("expected cached topics"),
        }
        assert_eq!(controller.view(), View::List);
    }

    #[test]
    fn back_with_no_topics_is_an_explicit_empty_state() {
        let mut controller = Controller::new(Node::Hot);
        controller.select_topic(1);
        assert_eq!(controller.back(), ListState::Empty);
    }

    #[test]
    fn back_invalidates_the_inflight_detail_fetch() {
        let mut controller = Controller::new(Node::Hot);
        let ticket = controller.select_topic(1);
        controller.back();
        assert!(!controller.apply_topic_page(ticket.generation, 99));
        assert_eq!(controller.total_replies(), 0);
    }

    #[test]
    fn refresh_refetches_the_current_view() {
        let mut controller = Controller::new(Node::Play);
        assert_eq!(controller.refresh().request, FetchRequest::TopicList(Node::Play));

        let mut controller = controller_on_page(9, 2, 100);
        assert_eq!(
            controller.refresh().request,
            FetchRequest::TopicPage {
                topic_id: 9,
                page: 2
            }
        );
    }

    #[test]
    fn stale_completions_are_discarded() {
        let mut controller = Controller::new(Node::Hot);
        let slow_list = controller.select_node(Node::Hot);
        let fast_detail = controller.select_topic(3);

        // The newer detail fetch lands first.
        assert!(controller.apply_topic_page(fast_detail.generation, 50));
        // The older list fetch completes late and is ignored.
        assert!(!controller.apply_topic_list(slow_list.generation, summaries(4)));
        assert!(controller.topics().is_empty());
        assert_eq!(controller.total_replies(), 50);
    }
}
