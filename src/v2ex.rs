use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use url::Url;

use crate::proxy::TransportProxy;

pub const DEFAULT_BASE_URL: &str = "https://www.v2ex.com/api/";

static BASE_URL: Lazy<Url> = Lazy::new(|| Url::parse(DEFAULT_BASE_URL).expect("valid base url"));

/// Everything a fetch can fail with. All variants are recovered at the fetch
/// boundary and shown as a message; none propagate further.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("api token is not configured")]
    MissingToken,
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request failed: HTTP {status} {message}")]
    HttpStatus { status: u16, message: String },
    #[error("unexpected response: {0}")]
    MalformedResponse(String),
    #[error("topic not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Node {
    #[default]
    Hot,
    Tech,
    Creative,
    Play,
    /// Served by the same endpoint as `Hot`; kept as a separate node because
    /// the remote API has no distinct all-time-hot listing.
    HotTopics,
    All,
}

impl Node {
    pub fn endpoint(&self) -> (&'static str, &'static [(&'static str, &'static str)]) {
        match self {
            Node::Hot | Node::HotTopics => ("topics/hot.json", &[]),
            Node::Tech => ("topics/show.json", &[("node_name", "tech")]),
            Node::Creative => ("topics/show.json", &[("node_name", "creative")]),
            Node::Play => ("topics/show.json", &[("node_name", "play")]),
            Node::All => ("topics/latest.json", &[]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Hot => "hot",
            Node::Tech => "tech",
            Node::Creative => "creative",
            Node::Play => "play",
            Node::HotTopics => "hot_topics",
            Node::All => "all",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Node::Hot => "Hot",
            Node::Tech => "Tech",
            Node::Creative => "Creative",
            Node::Play => "Play",
            Node::HotTopics => "Hot Topics",
            Node::All => "All",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub id: i64,
    pub title: String,
    pub replies: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDetail {
    pub title: String,
    pub body: String,
    pub node_title: String,
    pub author: String,
    pub total_replies: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub author: String,
    pub body: String,
}

/// One page of a topic. A failed reply fetch does not discard the detail;
/// the error rides along for the caller to render inline.
#[derive(Debug)]
pub struct TopicPage {
    pub detail: TopicDetail,
    pub replies: Vec<Reply>,
    pub replies_error: Option<FetchError>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub token: String,
    pub proxy: TransportProxy,
    pub base_url: Option<Url>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    token: String,
    base_url: Url,
}

impl Client {
    /// Builds a client from a settings snapshot. The proxy and token are
    /// fixed for the lifetime of the client; callers construct a fresh one
    /// per operation.
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http = match config.http_client {
            Some(client) => client,
            None => {
                let builder = HttpClient::builder()
                    .connect_timeout(Duration::from_secs(30))
                    .timeout(Duration::from_secs(30));
                config.proxy.apply(builder)?.build()?
            }
        };

        Ok(Client {
            http,
            token: config.token,
            base_url: config.base_url.unwrap_or_else(|| BASE_URL.clone()),
        })
    }

    pub fn fetch_topic_list(&self, node: Node) -> Result<Vec<TopicSummary>, FetchError> {
        let (path, params) = node.endpoint();
        let resp = self.request(path, params)?;
        let topics: Vec<RawTopic> = decode(resp)?;
        if topics.is_empty() {
            return Err(FetchError::MalformedResponse(
                "the listing contained no topics".into(),
            ));
        }
        Ok(topics
            .into_iter()
            .map(|topic| TopicSummary {
                id: topic.id,
                title: topic.title,
                replies: topic.replies,
            })
            .collect())
    }

    pub fn fetch_topic_detail(&self, topic_id: i64, page: u32) -> Result<TopicPage, FetchError> {
        let id = topic_id.to_string();
        let resp = self.request("topics/show.json", &[("id", id.as_str())])?;
        let mut topics: Vec<RawTopic> = decode(resp)?;
        if topics.is_empty() {
            return Err(FetchError::NotFound);
        }
        let topic = topics.swap_remove(0);
        let detail = TopicDetail {
            title: topic.title,
            body: topic.content,
            node_title: topic.node.map(|node| node.title).unwrap_or_default(),
            author: topic.member.map(|member| member.username).unwrap_or_default(),
            total_replies: topic.replies,
        };

        let (replies, replies_error) = match self.fetch_replies(topic_id, page) {
            Ok(replies) => (replies, None),
            Err(err) => (Vec::new(), Some(err)),
        };

        Ok(TopicPage {
            detail,
            replies,
            replies_error,
        })
    }

    fn fetch_replies(&self, topic_id: i64, page: u32) -> Result<Vec<Reply>, FetchError> {
        let id = topic_id.to_string();
        let page = page.to_string();
        let resp = self.request(
            "replies/show.json",
            &[("topic_id", id.as_str()), ("p", page.as_str())],
        )?;
        let replies: Vec<RawReply> = decode(resp)?;
        Ok(replies
            .into_iter()
            .map(|reply| Reply {
                author: reply.member.map(|member| member.username).unwrap_or_default(),
                body: reply.content,
            })
            .collect())
    }

    fn request(&self, path: &str, params: &[(&str, &str)]) -> Result<Response, FetchError> {
        if self.token.trim().is_empty() {
            return Err(FetchError::MissingToken);
        }

        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| FetchError::MalformedResponse(format!("invalid path {path}: {err}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()?;

        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let message = resp.text().unwrap_or_default();
            Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, FetchError> {
    let body = resp.text()?;
    serde_json::from_str(&body).map_err(|err| FetchError::MalformedResponse(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    id: i64,
    title: String,
    replies: i64,
    #[serde(default)]
    content: String,
    #[serde(default)]
    node: Option<RawNode>,
    #[serde(default)]
    member: Option<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    title: String,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    username: String,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default)]
    content: String,
    #[serde(default)]
    member: Option<RawMember>,
}
