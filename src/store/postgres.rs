/// Postgres 저장소
/// 입찰 반영은 하나의 트랜잭션 안에서 조건부 UPDATE 로 행을 잠근 뒤 입찰 기록을 upsert 한다.
/// 조건이 맞지 않으면 아무것도 쓰지 않는다.
/// 상태 전이에 딸린 알림은 경매 갱신과 같은 트랜잭션에서 저장한다.
// region:    --- Imports
use super::{AuctionStore, Committed, NotificationStore, UserDirectory};
use crate::auction::model::{AuctionItem, BidRecord, NewAuction, WinnerRecord};
use crate::database::queries;
use crate::database::DatabaseManager;
use crate::error::{AppError, AppResult};
use crate::notification::model::{NewNotification, Notification, NotificationType};
use crate::principal::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Rows
#[derive(FromRow)]
struct AuctionRow {
    id: i64,
    title: String,
    description: String,
    starting_bid: i64,
    current_bid: i64,
    highest_bidder: Option<i64>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    approval_status: String,
    lifecycle_status: String,
    is_processed: bool,
    rejection_reason: Option<String>,
    winner_id: Option<i64>,
    winner_name: Option<String>,
    winner_amount: Option<i64>,
    created_by: i64,
    created_at: DateTime<Utc>,
    version: i64,
}

impl AuctionRow {
    fn into_item(self, bids: Vec<BidRecord>) -> AppResult<AuctionItem> {
        let winner = match (self.winner_id, self.winner_name, self.winner_amount) {
            (Some(bidder_id), Some(bidder_name), Some(amount)) => Some(WinnerRecord {
                bidder_id,
                bidder_name,
                amount,
            }),
            _ => None,
        };
        Ok(AuctionItem {
            id: self.id,
            title: self.title,
            description: self.description,
            starting_bid: self.starting_bid,
            current_bid: self.current_bid,
            highest_bidder: self.highest_bidder,
            start_time: self.start_time,
            end_time: self.end_time,
            approval_status: self.approval_status.parse()?,
            lifecycle_status: self.lifecycle_status.parse()?,
            is_processed: self.is_processed,
            rejection_reason: self.rejection_reason,
            bids,
            winner,
            created_by: self.created_by,
            created_at: self.created_at,
            version: self.version,
        })
    }
}

#[derive(FromRow)]
struct AuctionBidRow {
    auction_id: i64,
    #[sqlx(flatten)]
    bid: BidRecord,
}

#[derive(FromRow)]
struct NotificationRow {
    id: i64,
    recipient_id: i64,
    recipient_role: String,
    notification_type: String,
    title: String,
    message: String,
    auction_id: Option<i64>,
    auction_title: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_notification(self) -> AppResult<Notification> {
        let notification_type = NotificationType::parse(&self.notification_type).ok_or_else(|| {
            AppError::TransientIo(format!("알 수 없는 알림 종류: {}", self.notification_type))
        })?;
        Ok(Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            recipient_role: self.recipient_role.parse()?,
            notification_type,
            title: self.title,
            message: self.message,
            auction_id: self.auction_id,
            auction_title: self.auction_title,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}
// endregion: --- Rows

// region:    --- Auction Store
pub struct PgAuctionStore {
    db: Arc<DatabaseManager>,
}

impl PgAuctionStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// 여러 경매 행에 입찰 목록을 붙인다.
    async fn attach_bids(&self, rows: Vec<AuctionRow>) -> AppResult<Vec<AuctionItem>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let bid_rows = sqlx::query_as::<_, AuctionBidRow>(queries::GET_BIDS_FOR_AUCTIONS)
            .bind(&ids)
            .fetch_all(self.db.pool())
            .await?;

        let mut by_auction: HashMap<i64, Vec<BidRecord>> = HashMap::new();
        for row in bid_rows {
            by_auction.entry(row.auction_id).or_default().push(row.bid);
        }

        rows.into_iter()
            .map(|row| {
                let bids = by_auction.remove(&row.id).unwrap_or_default();
                row.into_item(bids)
            })
            .collect()
    }
}

/// 하나의 연결(트랜잭션) 안에서 경매와 입찰을 함께 읽는다.
async fn fetch_item(conn: &mut PgConnection, id: i64) -> AppResult<Option<AuctionItem>> {
    let Some(row) = sqlx::query_as::<_, AuctionRow>(queries::GET_AUCTION)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let bids = sqlx::query_as::<_, BidRecord>(queries::GET_BIDS)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    row.into_item(bids).map(Some)
}

async fn upsert_bid(conn: &mut PgConnection, auction_id: i64, bid: &BidRecord) -> AppResult<()> {
    sqlx::query(queries::UPSERT_BID)
        .bind(auction_id)
        .bind(bid.bidder_id)
        .bind(&bid.bidder_name)
        .bind(bid.amount)
        .bind(bid.timestamp)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_notification(
    conn: &mut PgConnection,
    new: &NewNotification,
) -> AppResult<Notification> {
    let (auction_id, auction_title) = match &new.auction {
        Some(auction) => (Some(auction.id), Some(auction.title.clone())),
        None => (None, None),
    };
    sqlx::query_as::<_, NotificationRow>(queries::INSERT_NOTIFICATION)
        .bind(new.recipient_id)
        .bind(new.recipient_role.as_str())
        .bind(new.notification_type.as_str())
        .bind(&new.title)
        .bind(&new.message)
        .bind(auction_id)
        .bind(auction_title)
        .bind(new.created_at)
        .fetch_one(&mut *conn)
        .await?
        .into_notification()
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        let row = sqlx::query_as::<_, AuctionRow>(queries::INSERT_AUCTION)
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.starting_bid)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(new.created_by)
            .bind(Utc::now())
            .fetch_one(self.db.pool())
            .await?;
        info!("{:<12} --> 경매 저장 id: {}", "Store", row.id);
        row.into_item(Vec::new())
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_item(&mut conn, id).await
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        let rows = sqlx::query_as::<_, AuctionRow>(queries::LIST_AUCTIONS)
            .fetch_all(self.db.pool())
            .await?;
        self.attach_bids(rows).await
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        let rows = sqlx::query_as::<_, AuctionRow>(queries::LIST_UNPROCESSED_AUCTIONS)
            .fetch_all(self.db.pool())
            .await?;
        self.attach_bids(rows).await
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        let bid = bid.clone();
        self.db
            .transaction::<_, Option<AuctionItem>, AppError>(move |tx| {
                Box::pin(async move {
                    // 현재 가격 확인 및 업데이트 (행 잠금)
                    let updated: Option<i64> = sqlx::query_scalar(queries::APPLY_BID_PRICE)
                        .bind(auction_id)
                        .bind(bid.amount)
                        .bind(bid.bidder_id)
                        .bind(bid.timestamp)
                        .fetch_optional(&mut **tx)
                        .await?;

                    if updated.is_none() {
                        debug!(
                            "{:<12} --> 조건부 갱신 불발: auction={}, amount={}",
                            "Store", auction_id, bid.amount
                        );
                        return Ok(None);
                    }

                    upsert_bid(&mut **tx, auction_id, &bid).await?;
                    fetch_item(&mut **tx, auction_id).await
                })
            })
            .await
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        let item = item.clone();
        self.db
            .transaction::<_, Option<Committed>, AppError>(move |tx| {
                Box::pin(async move {
                    let (winner_id, winner_name, winner_amount) = match &item.winner {
                        Some(w) => (Some(w.bidder_id), Some(w.bidder_name.clone()), Some(w.amount)),
                        None => (None, None, None),
                    };
                    let version: Option<i64> =
                        sqlx::query_scalar(queries::COMPARE_AND_SWAP_AUCTION)
                            .bind(item.id)
                            .bind(&item.title)
                            .bind(&item.description)
                            .bind(item.starting_bid)
                            .bind(item.current_bid)
                            .bind(item.highest_bidder)
                            .bind(item.start_time)
                            .bind(item.end_time)
                            .bind(item.approval_status.as_str())
                            .bind(item.lifecycle_status.as_str())
                            .bind(item.is_processed)
                            .bind(&item.rejection_reason)
                            .bind(winner_id)
                            .bind(winner_name)
                            .bind(winner_amount)
                            .bind(item.version)
                            .fetch_optional(&mut **tx)
                            .await?;

                    let Some(version) = version else {
                        return Ok(None);
                    };

                    let bidder_ids: Vec<i64> = item.bids.iter().map(|b| b.bidder_id).collect();
                    sqlx::query(queries::PRUNE_BIDS)
                        .bind(item.id)
                        .bind(&bidder_ids)
                        .execute(&mut **tx)
                        .await?;
                    for bid in &item.bids {
                        upsert_bid(&mut **tx, item.id, bid).await?;
                    }

                    // 알림 적재 (실패 시 전이도 롤백)
                    let mut saved_notifications = Vec::with_capacity(notifications.len());
                    for new in &notifications {
                        saved_notifications.push(insert_notification(&mut **tx, new).await?);
                    }

                    let mut saved = item;
                    saved.version = version;
                    Ok(Some(Committed {
                        item: saved,
                        notifications: saved_notifications,
                    }))
                })
            })
            .await
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        let result = sqlx::query(queries::DELETE_AUCTION)
            .bind(id)
            .bind(expected_version)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
// endregion: --- Auction Store

// region:    --- Notification Store
pub struct PgNotificationStore {
    db: Arc<DatabaseManager>,
}

impl PgNotificationStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, new: NewNotification) -> AppResult<Notification> {
        let mut conn = self.db.pool().acquire().await?;
        insert_notification(&mut conn, &new).await
    }

    async fn list_for(&self, recipient_id: i64) -> AppResult<Vec<Notification>> {
        sqlx::query_as::<_, NotificationRow>(queries::LIST_NOTIFICATIONS)
            .bind(recipient_id)
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(NotificationRow::into_notification)
            .collect()
    }

    async fn unread_count(&self, recipient_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(queries::COUNT_UNREAD_NOTIFICATIONS)
            .bind(recipient_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> AppResult<bool> {
        let result = sqlx::query(queries::MARK_NOTIFICATION_READ)
            .bind(notification_id)
            .bind(recipient_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(&self, recipient_id: i64) -> AppResult<u64> {
        let result = sqlx::query(queries::MARK_ALL_NOTIFICATIONS_READ)
            .bind(recipient_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self, recipient_id: i64) -> AppResult<u64> {
        let result = sqlx::query(queries::CLEAR_NOTIFICATIONS)
            .bind(recipient_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
// endregion: --- Notification Store

// region:    --- User Directory
pub struct PgUserDirectory {
    db: Arc<DatabaseManager>,
}

impl PgUserDirectory {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get(&self, id: i64) -> AppResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(queries::GET_USER)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    async fn admins(&self) -> AppResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(queries::LIST_ADMINS)
            .fetch_all(self.db.pool())
            .await?)
    }
}
// endregion: --- User Directory
