use super::model::{AuctionItem, WinnerRecord};
use super::state::{ApprovalStatus, LifecycleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 실시간 채널로 전달되는 경매 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuctionEvent {
    // 입찰 이벤트 (새 현재가 + 입찰자)
    BidPlaced {
        auction_id: i64,
        bidder_id: i64,
        bidder_name: String,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 진행 상태 변경 이벤트
    StatusChanged {
        auction_id: i64,
        lifecycle_status: LifecycleStatus,
        winner: Option<WinnerRecord>,
    },
    // 승인 상태 변경 이벤트
    ApprovalChanged {
        auction_id: i64,
        approval_status: ApprovalStatus,
        reason: Option<String>,
    },
}

impl AuctionEvent {
    /// 채널 이벤트 이름
    pub fn name(&self) -> &'static str {
        match self {
            AuctionEvent::BidPlaced { .. } => "bid_placed",
            AuctionEvent::StatusChanged { .. } => "auction_status",
            AuctionEvent::ApprovalChanged { .. } => "auction_approval",
        }
    }

    pub fn auction_id(&self) -> i64 {
        match self {
            AuctionEvent::BidPlaced { auction_id, .. }
            | AuctionEvent::StatusChanged { auction_id, .. }
            | AuctionEvent::ApprovalChanged { auction_id, .. } => *auction_id,
        }
    }

    pub fn status_of(item: &AuctionItem) -> Self {
        AuctionEvent::StatusChanged {
            auction_id: item.id,
            lifecycle_status: item.lifecycle_status,
            winner: item.winner.clone(),
        }
    }

    pub fn approval_of(item: &AuctionItem) -> Self {
        AuctionEvent::ApprovalChanged {
            auction_id: item.id,
            approval_status: item.approval_status,
            reason: item.rejection_reason.clone(),
        }
    }
}
