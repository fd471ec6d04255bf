/// 낙찰 메일 발송
/// 메일 서비스는 외부 협력자이며, 본 서비스는 Kafka 토픽에 메일 요청을 발행한다.
/// 발송은 최선 노력(best-effort)이고 실패가 경매 전이를 막지 않는다.
// region:    --- Imports
use crate::auction::model::AuctionItem;
use crate::error::AppResult;
use crate::message_broker::KafkaProducer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

/// 메일 본문에 들어가는 경매 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSummary {
    pub auction_id: i64,
    pub title: String,
    pub winning_bid: i64,
    pub ended_at: DateTime<Utc>,
}

impl AuctionSummary {
    pub fn of(item: &AuctionItem, winning_bid: i64) -> Self {
        Self {
            auction_id: item.id,
            title: item.title.clone(),
            winning_bid,
            ended_at: item.end_time,
        }
    }
}

#[derive(Debug, Serialize)]
struct WinnerMailRequest<'a> {
    kind: &'static str,
    recipient: &'a EmailRecipient,
    auction: &'a AuctionSummary,
}
// endregion: --- Model

// region:    --- Winner Mailer
#[async_trait]
pub trait WinnerMailer: Send + Sync {
    async fn send_winner_email(
        &self,
        recipient: &EmailRecipient,
        summary: &AuctionSummary,
    ) -> AppResult<()>;
}

/// Kafka 메일 토픽으로 발행
pub struct KafkaMailer {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl KafkaMailer {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl WinnerMailer for KafkaMailer {
    async fn send_winner_email(
        &self,
        recipient: &EmailRecipient,
        summary: &AuctionSummary,
    ) -> AppResult<()> {
        let request = WinnerMailRequest {
            kind: "AUCTION_WON",
            recipient,
            auction: summary,
        };
        let payload = serde_json::to_string(&request)?;
        self.producer
            .send_message(&self.topic, &summary.auction_id.to_string(), &payload)
            .await
    }
}

/// 브로커 미설정 시 로그만 남기는 메일러
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl WinnerMailer for LogMailer {
    async fn send_winner_email(
        &self,
        recipient: &EmailRecipient,
        summary: &AuctionSummary,
    ) -> AppResult<()> {
        info!(
            "{:<12} --> 낙찰 메일(로그): to={}, auction={}, bid={}",
            "Mailer", recipient.email, summary.auction_id, summary.winning_bid
        );
        Ok(())
    }
}
// endregion: --- Winner Mailer
