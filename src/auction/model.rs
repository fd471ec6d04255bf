use super::state::{ApprovalStatus, LifecycleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상품 모델 (입찰 목록과 낙찰자를 포함한 집합체)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub starting_bid: i64,
    pub current_bid: i64,
    pub highest_bidder: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub approval_status: ApprovalStatus,
    pub lifecycle_status: LifecycleStatus,
    pub is_processed: bool,
    pub rejection_reason: Option<String>,
    pub bids: Vec<BidRecord>,
    pub winner: Option<WinnerRecord>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    /// 낙관적 갱신용 버전
    pub version: i64,
}

// 입찰 기록 (경매당 입찰자별 1건)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BidRecord {
    pub bidder_id: i64,
    pub bidder_name: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

// 낙찰자 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub bidder_id: i64,
    pub bidder_name: String,
    pub amount: i64,
}

// 경매 등록 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuction {
    pub title: String,
    pub description: String,
    pub starting_bid: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_by: i64,
}

impl AuctionItem {
    /// 신규 경매는 (Pending, Upcoming) 에서 시작한다.
    pub fn from_new(id: i64, new: NewAuction, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title,
            description: new.description,
            starting_bid: new.starting_bid,
            current_bid: new.starting_bid,
            highest_bidder: None,
            start_time: new.start_time,
            end_time: new.end_time,
            approval_status: ApprovalStatus::Pending,
            lifecycle_status: LifecycleStatus::Upcoming,
            is_processed: false,
            rejection_reason: None,
            bids: Vec::new(),
            winner: None,
            created_by: new.created_by,
            created_at,
            version: 0,
        }
    }

    pub fn has_bids(&self) -> bool {
        !self.bids.is_empty()
    }

    /// 입찰자의 기존 기록을 교체하거나 새로 추가하고 현재가를 갱신한다.
    /// 직전 최고 입찰자를 반환한다.
    pub fn upsert_bid(&mut self, bid: BidRecord) -> Option<i64> {
        let previous = self.highest_bidder;
        self.current_bid = bid.amount;
        self.highest_bidder = Some(bid.bidder_id);
        match self.bids.iter_mut().find(|b| b.bidder_id == bid.bidder_id) {
            Some(existing) => *existing = bid,
            None => self.bids.push(bid),
        }
        previous
    }

    /// 입찰자 id 목록 (중복 없음, 입찰 순서 유지)
    pub fn bidder_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = Vec::with_capacity(self.bids.len());
        for bid in &self.bids {
            if !ids.contains(&bid.bidder_id) {
                ids.push(bid.bidder_id);
            }
        }
        ids
    }

    /// 거절된 경매 재등록: 입찰/낙찰/처리 래치를 초기화하고 처음부터 다시 시작
    pub fn restart(&mut self) {
        self.bids.clear();
        self.winner = None;
        self.highest_bidder = None;
        self.current_bid = self.starting_bid;
        self.is_processed = false;
        self.rejection_reason = None;
        self.approval_status = ApprovalStatus::Pending;
        self.lifecycle_status = LifecycleStatus::Upcoming;
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        id: i64,
        seller: i64,
        starting_bid: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self::from_new(
            id,
            NewAuction {
                title: format!("item-{id}"),
                description: String::new(),
                starting_bid,
                start_time,
                end_time,
                created_by: seller,
            },
            start_time,
        )
    }
}
