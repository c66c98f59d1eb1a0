use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::TopicService;
use crate::pagination::{FetchRequest, FetchTicket};
use crate::v2ex::{FetchError, Node, TopicPage, TopicSummary};

/// Completion of a background fetch, tagged with the generation of the
/// ticket that started it so stale results can be dropped.
pub enum FetchResponse {
    TopicList {
        generation: u64,
        node: Node,
        result: Result<Vec<TopicSummary>, FetchError>,
    },
    TopicPage {
        generation: u64,
        topic_id: i64,
        page: u32,
        result: Result<TopicPage, FetchError>,
    },
}

/// Runs fetches off the caller's thread, one worker thread per request, and
/// reports completions over a channel. No cancellation: a fetch in flight
/// runs to completion and relies on generation tags to be ignored when
/// superseded.
pub struct Dispatcher {
    service: Arc<dyn TopicService>,
    tx: Sender<FetchResponse>,
    rx: Receiver<FetchResponse>,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn TopicService>) -> Self {
        let (tx, rx) = unbounded();
        Self { service, tx, rx }
    }

    pub fn responses(&self) -> &Receiver<FetchResponse> {
        &self.rx
    }

    pub fn spawn(&self, ticket: FetchTicket) {
        let service = self.service.clone();
        let tx = self.tx.clone();
        let generation = ticket.generation;
        match ticket.request {
            FetchRequest::TopicList(node) => {
                thread::spawn(move || {
                    let result = service.topic_list(node);
                    let _ = tx.send(FetchResponse::TopicList {
                        generation,
                        node,
                        result,
                    });
                });
            }
            FetchRequest::TopicPage { topic_id, page } => {
                thread::spawn(move || {
                    let result = service.topic_page(topic_id, page);
                    let _ = tx.send(FetchResponse::TopicPage {
                        generation,
                        topic_id,
                        page,
                        result,
                    });
                });
            }
        }
    }
}
