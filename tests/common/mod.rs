#![allow(dead_code)]
/// 테스트 공통 준비
/// 인메모리 저장소, 수동 시계, 기록용 메일러로 서비스를 조립한다.
// region:    --- Imports
use async_trait::async_trait;
use auction_lifecycle::app::{AppState, Backends};
use auction_lifecycle::auction::model::{AuctionItem, BidRecord, NewAuction};
use auction_lifecycle::auction::state::{ApprovalStatus, LifecycleStatus};
use auction_lifecycle::clock::{Clock, ManualClock};
use auction_lifecycle::config::Config;
use auction_lifecycle::error::{AppError, AppResult};
use auction_lifecycle::mailer::{AuctionSummary, EmailRecipient, WinnerMailer};
use auction_lifecycle::notification::model::{Notification, NotificationType};
use auction_lifecycle::principal::{Principal, Role};
use auction_lifecycle::store::{
    AuctionStore, MemoryAuctionStore, MemoryNotificationStore, MemoryUserDirectory,
    NotificationStore,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// endregion: --- Imports

pub const ADMIN: i64 = 1;
pub const SELLER: i64 = 10;
pub const ALICE: i64 = 20;
pub const BOB: i64 = 21;
pub const CAROL: i64 = 22;

/// 트레이싱 초기화 (여러 테스트에서 호출해도 한 번만 설정)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// region:    --- Recording Mailer
/// 발송 요청을 기록하는 메일러. fail 이 켜져 있으면 에러를 반환한다.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(EmailRecipient, AuctionSummary)>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(EmailRecipient, AuctionSummary)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WinnerMailer for RecordingMailer {
    async fn send_winner_email(
        &self,
        recipient: &EmailRecipient,
        summary: &AuctionSummary,
    ) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::TransientIo("메일 서버 응답 없음".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), summary.clone()));
        Ok(())
    }
}
// endregion: --- Recording Mailer

// region:    --- Harness
pub struct Harness {
    pub state: AppState,
    pub auctions: MemoryAuctionStore,
    pub notifications: MemoryNotificationStore,
    pub users: MemoryUserDirectory,
    pub mailer: Arc<RecordingMailer>,
    pub clock: ManualClock,
}

fn plain_auctions(store: MemoryAuctionStore) -> Arc<dyn AuctionStore> {
    Arc::new(store)
}

fn plain_notifications(store: MemoryNotificationStore) -> Arc<dyn NotificationStore> {
    Arc::new(store)
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(Config::default(), plain_auctions, plain_notifications).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::build(config, plain_auctions, plain_notifications).await
    }

    /// 경매 저장소를 감싼 구현으로 교체해서 조립 (장애 주입용)
    pub async fn with_store<F>(wrap: F) -> Self
    where
        F: FnOnce(MemoryAuctionStore) -> Arc<dyn AuctionStore>,
    {
        Self::build(Config::default(), wrap, plain_notifications).await
    }

    pub async fn with_store_and_config<F>(wrap: F, config: Config) -> Self
    where
        F: FnOnce(MemoryAuctionStore) -> Arc<dyn AuctionStore>,
    {
        Self::build(config, wrap, plain_notifications).await
    }

    /// 알림 저장소를 감싼 구현으로 교체해서 조립
    pub async fn with_notification_store<N>(wrap: N) -> Self
    where
        N: FnOnce(MemoryNotificationStore) -> Arc<dyn NotificationStore>,
    {
        Self::build(Config::default(), plain_auctions, wrap).await
    }

    async fn build<A, N>(config: Config, wrap_auctions: A, wrap_notifications: N) -> Self
    where
        A: FnOnce(MemoryAuctionStore) -> Arc<dyn AuctionStore>,
        N: FnOnce(MemoryNotificationStore) -> Arc<dyn NotificationStore>,
    {
        init_tracing();

        let notifications = MemoryNotificationStore::new();
        let auctions = MemoryAuctionStore::new(notifications.clone());
        let users = MemoryUserDirectory::new();
        let mailer = Arc::new(RecordingMailer::default());
        let clock = ManualClock::new(base_time());

        users.add(ADMIN, "admin", "admin@example.com", Role::Admin).await;
        users.add(SELLER, "seller", "seller@example.com", Role::Seller).await;
        users.add(ALICE, "alice", "alice@example.com", Role::Bidder).await;
        users.add(BOB, "bob", "bob@example.com", Role::Bidder).await;
        users.add(CAROL, "carol", "carol@example.com", Role::Bidder).await;

        let state = AppState::assemble(
            Backends {
                auctions: wrap_auctions(auctions.clone()),
                notifications: wrap_notifications(notifications.clone()),
                users: Arc::new(users.clone()),
                mailer: mailer.clone(),
                clock: Arc::new(clock.clone()),
            },
            &config,
        );

        Self {
            state,
            auctions,
            notifications,
            users,
            mailer,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 시작/종료 시간을 현재 기준 오프셋으로 지정한 (Pending, Upcoming) 경매
    pub fn listing(&self, id: i64, starting_bid: i64, start: Duration, end: Duration) -> AuctionItem {
        let now = self.now();
        AuctionItem::from_new(
            id,
            NewAuction {
                title: format!("경매 {id}"),
                description: "테스트 경매".to_string(),
                starting_bid,
                start_time: now + start,
                end_time: now + end,
                created_by: SELLER,
            },
            now,
        )
    }

    /// 시작된 지 1분, 종료까지 1시간 남은 (Approved, Live) 경매 저장
    pub async fn seed_live(&self, id: i64, starting_bid: i64) -> AuctionItem {
        let mut item = self.listing(id, starting_bid, Duration::minutes(-1), Duration::hours(1));
        item.approval_status = ApprovalStatus::Approved;
        item.lifecycle_status = LifecycleStatus::Live;
        self.auctions.insert(item).await
    }

    pub async fn auction(&self, id: i64) -> AuctionItem {
        self.auctions
            .get(id)
            .await
            .expect("저장소 조회 실패")
            .expect("경매 없음")
    }

    pub async fn notifications_for(&self, user: i64) -> Vec<Notification> {
        self.notifications
            .all()
            .await
            .into_iter()
            .filter(|n| n.recipient_id == user)
            .collect()
    }

    pub async fn count_of(&self, user: i64, kind: NotificationType) -> usize {
        self.notifications_for(user)
            .await
            .iter()
            .filter(|n| n.notification_type == kind)
            .count()
    }

    /// 백그라운드 태스크(상회 알림, 낙찰 메일)가 끝날 때까지 잠시 대기
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

pub fn admin() -> Principal {
    Principal::new(ADMIN, "admin", Role::Admin)
}

pub fn seller() -> Principal {
    Principal::new(SELLER, "seller", Role::Seller)
}

pub fn bidder(id: i64, name: &str) -> Principal {
    Principal::new(id, name, Role::Bidder)
}

pub fn bid(bidder_id: i64, name: &str, amount: i64, at: DateTime<Utc>) -> BidRecord {
    BidRecord {
        bidder_id,
        bidder_name: name.to_string(),
        amount,
        timestamp: at,
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}
// endregion: --- Harness
