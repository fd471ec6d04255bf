/// 알림 팬아웃
/// 1. 알림을 먼저 저장한다 (내구성 우선)
/// 2. 수신자의 user:<id> 토픽으로 푸시한다. 접속 중이 아니면 푸시는 버려지고,
///    다음 접속/조회 시 저장된 알림으로 전달된다.
/// 경매 상태 변경에 딸린 알림은 draft 로 만들어 경매 저장과 함께 커밋한 뒤 deliver 로 푸시한다.
// region:    --- Imports
use super::model::{AuctionRef, NewNotification, Notification, NotificationType};
use crate::auction::model::AuctionItem;
use crate::channel::{ChannelRegistry, Topic};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::principal::Role;
use crate::store::{NotificationStore, UserDirectory};
use std::sync::Arc;
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Notification Service
/// 푸시 이벤트 이름
pub const NOTIFICATION_EVENT: &str = "notification";

/// 수신자 정보를 제외한 알림 내용
#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub auction: Option<AuctionRef>,
}

impl NotificationContent {
    pub fn new(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            title: title.into(),
            message: message.into(),
            auction: None,
        }
    }

    pub fn about(mut self, item: &AuctionItem) -> Self {
        self.auction = Some(AuctionRef {
            id: item.id,
            title: item.title.clone(),
        });
        self
    }
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
    channels: Arc<ChannelRegistry>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        channels: Arc<ChannelRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            users,
            channels,
            clock,
        }
    }

    /// 저장 전 알림 초안
    pub fn draft(
        &self,
        recipient_id: i64,
        recipient_role: Role,
        content: NotificationContent,
    ) -> NewNotification {
        NewNotification {
            recipient_id,
            recipient_role,
            notification_type: content.notification_type,
            title: content.title,
            message: content.message,
            auction: content.auction,
            created_at: self.clock.now(),
        }
    }

    /// 경매 입찰자 전원에 대한 초안 (exclude 는 제외)
    pub fn draft_bidders(
        &self,
        item: &AuctionItem,
        exclude: Option<i64>,
        content: &NotificationContent,
    ) -> Vec<NewNotification> {
        item.bidder_ids()
            .into_iter()
            .filter(|bidder_id| Some(*bidder_id) != exclude)
            .map(|bidder_id| self.draft(bidder_id, Role::Bidder, content.clone()))
            .collect()
    }

    /// 관리자 id 목록
    pub async fn admin_ids(&self) -> AppResult<Vec<i64>> {
        Ok(self.users.admins().await?.into_iter().map(|u| u.id).collect())
    }

    /// 이미 저장된 알림을 수신자 토픽으로 푸시
    pub fn deliver(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.push(notification);
        }
    }

    fn push(&self, notification: &Notification) {
        match serde_json::to_value(notification) {
            Ok(payload) => {
                let delivered = self.channels.publish(
                    Topic::User(notification.recipient_id),
                    NOTIFICATION_EVENT,
                    payload,
                );
                debug!(
                    "{:<12} --> 알림 {} -> user {} (push {})",
                    "Notify", notification.notification_type, notification.recipient_id, delivered
                );
            }
            Err(e) => warn!("{:<12} --> 알림 직렬화 실패: {:?}", "Notify", e),
        }
    }

    /// 단일 수신자 알림
    pub async fn notify(
        &self,
        recipient_id: i64,
        recipient_role: Role,
        content: NotificationContent,
    ) -> AppResult<Notification> {
        let notification = self
            .store
            .insert(self.draft(recipient_id, recipient_role, content))
            .await?;
        self.push(&notification);
        Ok(notification)
    }

    /// 모든 관리자에게 알림
    pub async fn notify_admins(&self, content: NotificationContent) -> AppResult<usize> {
        let admins = self.admin_ids().await?;
        for admin_id in &admins {
            self.notify(*admin_id, Role::Admin, content.clone()).await?;
        }
        info!(
            "{:<12} --> 관리자 알림 {}: {}명",
            "Notify", content.notification_type, admins.len()
        );
        Ok(admins.len())
    }

    /// 수신자 알림 목록 (최신순)
    pub async fn list(&self, recipient_id: i64) -> AppResult<Vec<Notification>> {
        self.store.list_for(recipient_id).await
    }

    pub async fn unread_count(&self, recipient_id: i64) -> AppResult<i64> {
        self.store.unread_count(recipient_id).await
    }

    pub async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> AppResult<()> {
        if self.store.mark_read(recipient_id, notification_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("알림 {notification_id}")))
        }
    }

    pub async fn mark_all_read(&self, recipient_id: i64) -> AppResult<u64> {
        self.store.mark_all_read(recipient_id).await
    }

    pub async fn clear(&self, recipient_id: i64) -> AppResult<u64> {
        let removed = self.store.clear(recipient_id).await?;
        info!(
            "{:<12} --> 알림 비우기 user {}: {}건",
            "Notify", recipient_id, removed
        );
        Ok(removed)
    }
}
// endregion: --- Notification Service
