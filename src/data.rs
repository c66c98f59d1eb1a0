use crate::proxy;
use crate::settings::SettingsHandle;
use crate::v2ex::{self, FetchError, Node, TopicPage, TopicSummary};

pub trait TopicService: Send + Sync {
    fn topic_list(&self, node: Node) -> Result<Vec<TopicSummary>, FetchError>;
    fn topic_page(&self, topic_id: i64, page: u32) -> Result<TopicPage, FetchError>;
}

/// Live implementation. Each call builds a fresh client from a settings
/// snapshot, so token or proxy changes apply to the next call, never to one
/// already in flight.
pub struct V2exTopicService {
    settings: SettingsHandle,
}

impl V2exTopicService {
    pub fn new(settings: SettingsHandle) -> Self {
        Self { settings }
    }

    fn client(&self) -> Result<v2ex::Client, FetchError> {
        let snapshot = self.settings.snapshot();
        v2ex::Client::new(v2ex::ClientConfig {
            token: snapshot.api_token,
            proxy: proxy::resolve(&snapshot.proxy),
            ..v2ex::ClientConfig::default()
        })
    }
}

impl TopicService for V2exTopicService {
    fn topic_list(&self, node: Node) -> Result<Vec<TopicSummary>, FetchError> {
        self.client()?.fetch_topic_list(node)
    }

    fn topic_page(&self, topic_id: i64, page: u32) -> Result<TopicPage, FetchError> {
        self.client()?.fetch_topic_detail(topic_id, page)
    }
}

pub fn node_from_key(key: &str) -> Option<Node> {
    match key {
        "hot" => Some(Node::Hot),
        "tech" => Some(Node::Tech),
        "creative" => Some(Node::Creative),
        "play" => Some(Node::Play),
        "hot_topics" => Some(Node::HotTopics),
        "all" => Some(Node::All),
        _ => None,
    }
}
