/// 입찰 원장 (Bid Ledger)
/// 1. 입찰 검증 (경매 존재, LIVE, 금액)
/// 2. 단일 조건부 갱신으로 현재가 + 입찰자 기록 반영, 충돌 시 재조회 후 재시도
/// 3. 경매 토픽으로 새 가격 방송, 직전 최고 입찰자에게 상회 알림 (fire-and-forget)
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{AuctionItem, BidRecord};
use crate::auction::state;
use crate::channel::ChannelRegistry;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::notification::model::NotificationType;
use crate::notification::{NotificationContent, NotificationService};
use crate::principal::Role;
use crate::store::AuctionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub bidder_name: String,
    pub amount: i64,
}

// 기본 최대 재시도 횟수
pub const MAX_RETRIES: u32 = 100;

pub struct BidLedger {
    auctions: Arc<dyn AuctionStore>,
    channels: Arc<ChannelRegistry>,
    notifier: Arc<NotificationService>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl BidLedger {
    pub fn new(
        auctions: Arc<dyn AuctionStore>,
        channels: Arc<ChannelRegistry>,
        notifier: Arc<NotificationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auctions,
            channels,
            notifier,
            clock,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// 입찰
    pub async fn place_bid(&self, cmd: PlaceBidCommand) -> AppResult<AuctionItem> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
        if cmd.bidder_name.trim().is_empty() {
            return Err(AppError::Validation("입찰자 이름이 비어 있습니다.".to_string()));
        }

        let mut retries = 0;
        while retries < self.max_retries {
            // 아이템 정보 조회
            let item = self
                .auctions
                .get(cmd.auction_id)
                .await?
                .ok_or(AppError::AuctionNotFound(cmd.auction_id))?;

            let now = self.clock.now();

            // 경매 상태 및 금액 검증
            state::check_bid(&item, cmd.bidder_id, cmd.amount, now)?;

            let bid = BidRecord {
                bidder_id: cmd.bidder_id,
                bidder_name: cmd.bidder_name.clone(),
                amount: cmd.amount,
                timestamp: now,
            };

            // 쓰기 시점 조건부 반영
            match self.auctions.apply_bid(cmd.auction_id, &bid).await? {
                Some(updated) => {
                    info!(
                        "{:<12} --> 입찰 성공: auction={}, 현재 가격 {}",
                        "Command", updated.id, updated.current_bid
                    );
                    self.after_bid(&updated, &bid);
                    return Ok(updated);
                }
                None => {
                    warn!(
                        "{:<12} --> 조건부 갱신 충돌: 재조회 후 재시도 ({}/{})",
                        "Command",
                        retries + 1,
                        self.max_retries
                    );
                    retries += 1;
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(AppError::RetriesExhausted)
    }

    /// 가격 방송 및 상회 알림
    fn after_bid(&self, item: &AuctionItem, bid: &BidRecord) {
        self.channels.publish_auction_event(&AuctionEvent::BidPlaced {
            auction_id: item.id,
            bidder_id: bid.bidder_id,
            bidder_name: bid.bidder_name.clone(),
            amount: bid.amount,
            timestamp: bid.timestamp,
        });

        // 새 입찰자를 제외한 최고 입찰자가 직전 선두
        let previous_leader = state::rank_bids(&item.bids)
            .into_iter()
            .find(|b| b.bidder_id != bid.bidder_id)
            .map(|b| b.bidder_id);

        if let Some(outbid_id) = previous_leader {
            let notifier = Arc::clone(&self.notifier);
            let content = NotificationContent::new(
                NotificationType::Outbid,
                "You have been outbid",
                format!(
                    "A higher bid of {} was placed on \"{}\".",
                    bid.amount, item.title
                ),
            )
            .about(item);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(outbid_id, Role::Bidder, content).await {
                    error!("{:<12} --> 상회 알림 실패: {:?}", "Command", e);
                }
            });
        }
    }
}
// endregion: --- Commands
