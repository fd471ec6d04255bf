/// 실시간 채널 레지스트리
/// 연결(connection) 단위로 토픽을 구독하고, 발행된 이벤트를 구독 중인 연결에만 전달한다.
/// 토픽: user:<id>, auction:<id>, global
/// 연결되지 않은 수신자에게 보내는 이벤트는 버려진다. (내구성은 저장소가 담당)
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::error::AppError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

// endregion: --- Imports

// region:    --- Topic
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    User(i64),
    Auction(i64),
    Global,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::Auction(id) => write!(f, "auction:{id}"),
            Topic::Global => f.write_str("global"),
        }
    }
}

impl FromStr for Topic {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::Validation(format!("잘못된 토픽: {s}"));
        if s == "global" {
            return Ok(Topic::Global);
        }
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: i64 = id.parse().map_err(|_| invalid())?;
        match kind {
            "user" => Ok(Topic::User(id)),
            "auction" => Ok(Topic::Auction(id)),
            _ => Err(invalid()),
        }
    }
}

/// 연결로 전달되는 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}
// endregion: --- Topic

// region:    --- Channel Registry
pub struct ChannelRegistry {
    /// 연결별 송신 채널
    connections: DashMap<ConnectionId, mpsc::Sender<ChannelMessage>>,
    /// 토픽별 구독 연결
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    /// 연결별 구독 토픽
    by_connection: DashMap<ConnectionId, HashSet<Topic>>,
    id_counter: AtomicU64,
    buffer: usize,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChannelRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            topics: DashMap::new(),
            by_connection: DashMap::new(),
            id_counter: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// 새 연결 등록
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ChannelMessage>) {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(id, tx);
        self.by_connection.insert(id, HashSet::new());
        debug!("{:<12} --> 연결 등록: connection={}", "Channel", id);
        (id, rx)
    }

    /// 토픽 구독. 등록되지 않은 연결이면 false
    pub fn subscribe(&self, connection_id: ConnectionId, topic: Topic) -> bool {
        // disconnect 가 목록을 가져가기 전에 두 맵을 모두 갱신하도록 엔트리를 잡은 채로 추가한다
        let Some(mut subscribed) = self.by_connection.get_mut(&connection_id) else {
            return false;
        };
        subscribed.insert(topic);
        self.topics.entry(topic).or_default().insert(connection_id);
        drop(subscribed);
        debug!(
            "{:<12} --> 구독: connection={}, topic={}",
            "Channel", connection_id, topic
        );
        true
    }

    /// 토픽 구독 해제
    pub fn unsubscribe(&self, connection_id: ConnectionId, topic: Topic) -> bool {
        let removed = self
            .by_connection
            .get_mut(&connection_id)
            .map(|mut topics| topics.remove(&topic))
            .unwrap_or(false);
        if removed {
            self.remove_from_topic(topic, connection_id);
        }
        removed
    }

    /// 연결 종료: 모든 구독 해제
    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
        if let Some((_, topics)) = self.by_connection.remove(&connection_id) {
            for topic in topics {
                self.remove_from_topic(topic, connection_id);
            }
        }
        debug!("{:<12} --> 연결 종료: connection={}", "Channel", connection_id);
    }

    fn remove_from_topic(&self, topic: Topic, connection_id: ConnectionId) {
        if let Some(mut subscribers) = self.topics.get_mut(&topic) {
            subscribers.remove(&connection_id);
        }
        self.topics.remove_if(&topic, |_, subscribers| subscribers.is_empty());
    }

    /// 토픽에 구독자가 있는지 (수신자 접속 여부)
    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.subscriber_count(topic) > 0
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map(|s| s.len()).unwrap_or(0)
    }

    /// 이벤트 발행. 실제로 전달된 연결 수를 반환한다.
    pub fn publish(&self, topic: Topic, event: &str, payload: serde_json::Value) -> usize {
        let subscribers: Vec<ConnectionId> = match self.topics.get(&topic) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };

        let message = ChannelMessage {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        };

        let mut delivered = 0;
        for connection_id in subscribers {
            let Some(tx) = self.connections.get(&connection_id).map(|tx| tx.clone()) else {
                continue;
            };
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => warn!(
                    "{:<12} --> 버퍼 초과로 이벤트 폐기: connection={}, topic={}",
                    "Channel", connection_id, topic
                ),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.disconnect(connection_id);
                }
            }
        }
        delivered
    }

    /// 경매 이벤트 발행
    /// 입찰은 경매 토픽에만, 상태/승인 변경은 경매 토픽과 global 에 전달한다.
    pub fn publish_auction_event(&self, event: &AuctionEvent) -> usize {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{:<12} --> 이벤트 직렬화 실패: {:?}", "Channel", e);
                return 0;
            }
        };
        let mut delivered =
            self.publish(Topic::Auction(event.auction_id()), event.name(), payload.clone());
        if !matches!(event, AuctionEvent::BidPlaced { .. }) {
            delivered += self.publish(Topic::Global, event.name(), payload);
        }
        delivered
    }
}
// endregion: --- Channel Registry
