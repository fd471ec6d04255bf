use crate::principal::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    NewAuctionPending,
    AuctionResubmitted,
    AuctionApproved,
    AuctionRejected,
    AutoRejected,
    AuctionLive,
    Outbid,
    AuctionWon,
    AuctionLost,
    AuctionEnded,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewAuctionPending => "NEW_AUCTION_PENDING",
            NotificationType::AuctionResubmitted => "AUCTION_RESUBMITTED",
            NotificationType::AuctionApproved => "AUCTION_APPROVED",
            NotificationType::AuctionRejected => "AUCTION_REJECTED",
            NotificationType::AutoRejected => "AUTO_REJECTED",
            NotificationType::AuctionLive => "AUCTION_LIVE",
            NotificationType::Outbid => "OUTBID",
            NotificationType::AuctionWon => "AUCTION_WON",
            NotificationType::AuctionLost => "AUCTION_LOST",
            NotificationType::AuctionEnded => "AUCTION_ENDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            NotificationType::NewAuctionPending,
            NotificationType::AuctionResubmitted,
            NotificationType::AuctionApproved,
            NotificationType::AuctionRejected,
            NotificationType::AutoRejected,
            NotificationType::AuctionLive,
            NotificationType::Outbid,
            NotificationType::AuctionWon,
            NotificationType::AuctionLost,
            NotificationType::AuctionEnded,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 알림 모델 (is_read 외에는 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub recipient_role: Role,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub auction_id: Option<i64>,
    pub auction_title: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// 알림이 가리키는 경매
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRef {
    pub id: i64,
    pub title: String,
}

// 알림 생성 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub recipient_role: Role,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub auction: Option<AuctionRef>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(id: i64, new: NewNotification) -> Self {
        let (auction_id, auction_title) = match new.auction {
            Some(auction) => (Some(auction.id), Some(auction.title)),
            None => (None, None),
        };
        Self {
            id,
            recipient_id: new.recipient_id,
            recipient_role: new.recipient_role,
            notification_type: new.notification_type,
            title: new.title,
            message: new.message,
            auction_id,
            auction_title,
            is_read: false,
            created_at: new.created_at,
        }
    }
}
