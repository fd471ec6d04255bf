/// 저장소 트레이트
/// 경매 집합체는 조건부(낙관적) 갱신으로만 변경된다. 비관적 락은 사용하지 않는다.
// region:    --- Imports
use crate::auction::model::{AuctionItem, BidRecord, NewAuction};
use crate::error::AppResult;
use crate::notification::model::{NewNotification, Notification};
use crate::principal::User;
use async_trait::async_trait;

// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod postgres;

pub use memory::{MemoryAuctionStore, MemoryNotificationStore, MemoryUserDirectory};
pub use postgres::{PgAuctionStore, PgNotificationStore, PgUserDirectory};
// endregion: --- Modules

// region:    --- Auction Store
/// 버전 비교 저장 결과
#[derive(Debug, Clone)]
pub struct Committed {
    /// 버전이 증가된 아이템
    pub item: AuctionItem,
    /// 함께 저장된 알림 (푸시 대상)
    pub notifications: Vec<Notification>,
}

#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem>;

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>>;

    /// 최신 등록 순
    async fn list(&self) -> AppResult<Vec<AuctionItem>>;

    /// is_processed = false 인 경매만
    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>>;

    /// 단일 원자적 조건부 입찰 반영
    /// 쓰기 시점에 경매가 LIVE 이고, 종료 시간 전이며, 현재가가 여전히 입찰가보다 낮을 때만
    /// 현재가를 갱신하고 입찰자 기록을 upsert 한다. 조건 불충족 시 None
    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>>;

    /// item.version 이 저장된 버전과 같을 때만 상태/입찰 목록을 교체하고,
    /// 같은 트랜잭션 안에서 변경에 딸린 알림을 함께 저장한다.
    /// 버전 충돌이나 에러 시 경매와 알림 어느 쪽도 쓰지 않는다.
    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>>;

    /// 버전이 일치할 때만 삭제
    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool>;
}
// endregion: --- Auction Store

// region:    --- Notification Store
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, new: NewNotification) -> AppResult<Notification>;

    /// 최신순
    async fn list_for(&self, recipient_id: i64) -> AppResult<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: i64) -> AppResult<i64>;

    /// 수신자 본인의 알림일 때만 true
    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> AppResult<bool>;

    async fn mark_all_read(&self, recipient_id: i64) -> AppResult<u64>;

    async fn clear(&self, recipient_id: i64) -> AppResult<u64>;
}
// endregion: --- Notification Store

// region:    --- User Directory
/// 외부 ID 서비스가 관리하는 사용자 조회
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<Option<User>>;

    async fn admins(&self) -> AppResult<Vec<User>>;
}
// endregion: --- User Directory
