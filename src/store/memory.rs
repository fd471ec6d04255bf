/// 인메모리 저장소
/// DATABASE_URL 없이 실행할 때와 테스트에서 사용한다.
/// 쓰기 락 하나 안에서 조건 확인과 갱신을 함께 수행해 Postgres 의 조건부 UPDATE 와 같은 원자성을 갖는다.
/// 경매 저장소는 알림 저장소를 공유해서, 상태 변경과 알림 적재를 두 락을 모두 잡은 채로 반영한다.
// region:    --- Imports
use super::{AuctionStore, Committed, NotificationStore, UserDirectory};
use crate::auction::model::{AuctionItem, BidRecord, NewAuction};
use crate::auction::state::{ApprovalStatus, LifecycleStatus};
use crate::error::AppResult;
use crate::notification::model::{NewNotification, Notification};
use crate::principal::{Role, User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// endregion: --- Imports

// region:    --- Auction Store
#[derive(Clone)]
pub struct MemoryAuctionStore {
    items: Arc<RwLock<HashMap<i64, AuctionItem>>>,
    next_id: Arc<AtomicI64>,
    outbox: MemoryNotificationStore,
}

impl MemoryAuctionStore {
    /// 전이 알림은 outbox 에 함께 저장된다.
    pub fn new(outbox: MemoryNotificationStore) -> Self {
        Self {
            items: Arc::default(),
            next_id: Arc::default(),
            outbox,
        }
    }

    /// 임의 상태의 경매를 그대로 저장 (테스트 준비용)
    pub async fn insert(&self, item: AuctionItem) -> AuctionItem {
        self.next_id.fetch_max(item.id, Ordering::SeqCst);
        self.items.write().await.insert(item.id, item.clone());
        item
    }
}

/// 쓰기 시점의 입찰 반영 조건
fn accepts_bid(item: &AuctionItem, bid: &BidRecord) -> bool {
    let price_ok = item.current_bid < bid.amount
        || (item.highest_bidder.is_none() && bid.amount >= item.starting_bid);
    item.approval_status == ApprovalStatus::Approved
        && item.lifecycle_status == LifecycleStatus::Live
        && !item.is_processed
        && bid.timestamp < item.end_time
        && price_ok
}

#[async_trait]
impl AuctionStore for MemoryAuctionStore {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let item = AuctionItem::from_new(id, new, Utc::now());
        self.items.write().await.insert(id, item.clone());
        Ok(item)
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        let mut items: Vec<AuctionItem> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        let mut items: Vec<AuctionItem> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| !item.is_processed)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&auction_id) else {
            return Ok(None);
        };
        if !accepts_bid(item, bid) {
            return Ok(None);
        }
        item.upsert_bid(bid.clone());
        item.version += 1;
        Ok(Some(item.clone()))
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        // 두 락을 먼저 모두 잡는다. 이후에는 await 없이 반영한다.
        let mut items = self.items.write().await;
        let mut rows = self.outbox.rows.write().await;
        match items.get_mut(&item.id) {
            Some(stored) if stored.version == item.version => {
                let mut next = item.clone();
                next.version += 1;
                *stored = next.clone();
                let notifications = notifications
                    .into_iter()
                    .map(|new| self.outbox.push(&mut rows, new))
                    .collect();
                Ok(Some(Committed {
                    item: next,
                    notifications,
                }))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        let mut items = self.items.write().await;
        match items.get(&id) {
            Some(stored) if stored.version == expected_version => {
                items.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
// endregion: --- Auction Store

// region:    --- Notification Store
#[derive(Clone, Default)]
pub struct MemoryNotificationStore {
    rows: Arc<RwLock<Vec<Notification>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 전체 알림 (생성 순)
    pub async fn all(&self) -> Vec<Notification> {
        self.rows.read().await.clone()
    }

    fn push(&self, rows: &mut Vec<Notification>, new: NewNotification) -> Notification {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let notification = Notification::from_new(id, new);
        rows.push(notification.clone());
        notification
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, new: NewNotification) -> AppResult<Notification> {
        let mut rows = self.rows.write().await;
        Ok(self.push(&mut rows, new))
    }

    async fn list_for(&self, recipient_id: i64) -> AppResult<Vec<Notification>> {
        let mut rows: Vec<Notification> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn unread_count(&self, recipient_id: i64) -> AppResult<i64> {
        let count = self
            .rows
            .read()
            .await
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count();
        Ok(count as i64)
    }

    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> AppResult<bool> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: i64) -> AppResult<u64> {
        let mut updated = 0;
        for notification in self.rows.write().await.iter_mut() {
            if notification.recipient_id == recipient_id && !notification.is_read {
                notification.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear(&self, recipient_id: i64) -> AppResult<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|n| n.recipient_id != recipient_id);
        Ok((before - rows.len()) as u64)
    }
}
// endregion: --- Notification Store

// region:    --- User Directory
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<RwLock<HashMap<i64, User>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: i64, name: &str, email: &str, role: Role) {
        self.users.write().await.insert(
            id,
            User {
                id,
                name: name.to_string(),
                email: email.to_string(),
                role: role.as_str().to_string(),
            },
        );
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn admins(&self) -> AppResult<Vec<User>> {
        let mut admins: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.role() == Role::Admin)
            .cloned()
            .collect();
        admins.sort_by_key(|u| u.id);
        Ok(admins)
    }
}
// endregion: --- User Directory
