mod common;

use async_trait::async_trait;
use auction_lifecycle::auction::model::{AuctionItem, BidRecord, NewAuction};
use auction_lifecycle::auction::state::{ApprovalStatus, LifecycleStatus, AUTO_REJECT_REASON};
use auction_lifecycle::config::{Config, SchedulerConfig};
use auction_lifecycle::error::{AppError, AppResult};
use auction_lifecycle::channel::Topic;
use auction_lifecycle::notification::model::{NewNotification, Notification, NotificationType};
use auction_lifecycle::store::{
    AuctionStore, Committed, MemoryAuctionStore, MemoryNotificationStore, NotificationStore,
};
use chrono::Duration;
use common::{bid, Harness, ALICE, BOB, CAROL, SELLER};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// region:    --- Faulty Stores
/// 특정 경매의 저장만 실패시키는 저장소
struct BrokenForOne {
    inner: MemoryAuctionStore,
    broken_id: i64,
}

#[async_trait]
impl AuctionStore for BrokenForOne {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        self.inner.create(new).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list().await
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list_unprocessed().await
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        self.inner.apply_bid(auction_id, bid).await
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        if item.id == self.broken_id {
            return Err(AppError::TransientIo("connection reset".to_string()));
        }
        self.inner.compare_and_swap(item, notifications).await
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        self.inner.delete(id, expected_version).await
    }
}

/// 첫 번째 저장 직전에 다른 작성자가 끼어든 것처럼 버전을 올리는 저장소
struct RacingWriter {
    inner: MemoryAuctionStore,
    raced: AtomicBool,
}

#[async_trait]
impl AuctionStore for RacingWriter {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        self.inner.create(new).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list().await
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list_unprocessed().await
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        self.inner.apply_bid(auction_id, bid).await
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            if let Some(current) = self.inner.get(item.id).await? {
                self.inner.compare_and_swap(&current, Vec::new()).await?;
            }
        }
        self.inner.compare_and_swap(item, notifications).await
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        self.inner.delete(id, expected_version).await
    }
}
/// 첫 번째 저장을 지연시키는 저장소 (시간 초과 재현용)
struct StallsOnce {
    inner: MemoryAuctionStore,
    stalled: AtomicBool,
    delay: std::time::Duration,
}

#[async_trait]
impl AuctionStore for StallsOnce {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        self.inner.create(new).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list().await
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list_unprocessed().await
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        self.inner.apply_bid(auction_id, bid).await
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.compare_and_swap(item, notifications).await
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        self.inner.delete(id, expected_version).await
    }
}

/// 낙찰 알림이 포함된 첫 번째 저장을 실패시키는 저장소 (트랜잭션 롤백 재현용)
struct FailsOnceOnWin {
    inner: MemoryAuctionStore,
    failed: AtomicBool,
}

#[async_trait]
impl AuctionStore for FailsOnceOnWin {
    async fn create(&self, new: NewAuction) -> AppResult<AuctionItem> {
        self.inner.create(new).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<AuctionItem>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list().await
    }

    async fn list_unprocessed(&self) -> AppResult<Vec<AuctionItem>> {
        self.inner.list_unprocessed().await
    }

    async fn apply_bid(&self, auction_id: i64, bid: &BidRecord) -> AppResult<Option<AuctionItem>> {
        self.inner.apply_bid(auction_id, bid).await
    }

    async fn compare_and_swap(
        &self,
        item: &AuctionItem,
        notifications: Vec<NewNotification>,
    ) -> AppResult<Option<Committed>> {
        let has_win = notifications
            .iter()
            .any(|n| n.notification_type == NotificationType::AuctionWon);
        if has_win && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(AppError::TransientIo("notification insert failed".to_string()));
        }
        self.inner.compare_and_swap(item, notifications).await
    }

    async fn delete(&self, id: i64, expected_version: i64) -> AppResult<bool> {
        self.inner.delete(id, expected_version).await
    }
}

/// 단독 알림 저장이 항상 실패하는 알림 저장소
struct RejectingInserts {
    inner: MemoryNotificationStore,
}

#[async_trait]
impl NotificationStore for RejectingInserts {
    async fn insert(&self, _new: NewNotification) -> AppResult<Notification> {
        Err(AppError::TransientIo("notifications table unavailable".to_string()))
    }

    async fn list_for(&self, recipient_id: i64) -> AppResult<Vec<Notification>> {
        self.inner.list_for(recipient_id).await
    }

    async fn unread_count(&self, recipient_id: i64) -> AppResult<i64> {
        self.inner.unread_count(recipient_id).await
    }

    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> AppResult<bool> {
        self.inner.mark_read(recipient_id, notification_id).await
    }

    async fn mark_all_read(&self, recipient_id: i64) -> AppResult<u64> {
        self.inner.mark_all_read(recipient_id).await
    }

    async fn clear(&self, recipient_id: i64) -> AppResult<u64> {
        self.inner.clear(recipient_id).await
    }
}
// endregion: --- Faulty Stores

/// 낙찰자 1명, 유찰자 2명인 (Approved, Live) 경매를 저장하고 종료 시간으로 이동
async fn seed_contested_and_expire(h: &Harness) {
    let t0 = h.now();
    let mut item = h.seed_live(1, 100).await;
    item.upsert_bid(bid(ALICE, "alice", 200, t0));
    item.upsert_bid(bid(CAROL, "carol", 220, t0));
    item.upsert_bid(bid(BOB, "bob", 250, t0));
    h.auctions.insert(item).await;
    h.clock.advance(Duration::hours(2));
}

async fn assert_close_notified_once(h: &Harness) {
    assert_eq!(h.count_of(BOB, NotificationType::AuctionWon).await, 1);
    assert_eq!(h.count_of(BOB, NotificationType::AuctionLost).await, 0);
    assert_eq!(h.count_of(ALICE, NotificationType::AuctionLost).await, 1);
    assert_eq!(h.count_of(CAROL, NotificationType::AuctionLost).await, 1);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionEnded).await, 1);
    assert_eq!(h.notifications.all().await.len(), 4);
}

/// 승인된 경매가 시작 시간에 도달하면 LIVE 가 되고 판매자는 알림 1건을 받는다.
#[tokio::test]
async fn test_approved_auction_goes_live() {
    let h = Harness::new().await;
    let mut item = h.listing(1, 100, Duration::seconds(-1), Duration::hours(1));
    item.approval_status = ApprovalStatus::Approved;
    h.auctions.insert(item).await;

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.went_live, 1);
    assert_eq!(report.transitions(), 1);

    let item = h.auction(1).await;
    assert_eq!(item.lifecycle_status, LifecycleStatus::Live);
    assert!(!item.is_processed);

    let seller_live = h.notifications_for(SELLER).await;
    assert_eq!(seller_live.len(), 1);
    assert_eq!(seller_live[0].notification_type, NotificationType::AuctionLive);
    assert_eq!(seller_live[0].title, "Auction is Live");
    assert_eq!(seller_live[0].auction_id, Some(1));

    // 다시 틱을 돌려도 중복 전이/알림 없음
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.transitions(), 0);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionLive).await, 1);
}

/// 승인되지 않은 채 시작 시간이 지나면 자동 거절되고 입찰이 있어도 낙찰자는 없다.
#[tokio::test]
async fn test_unapproved_auction_is_auto_rejected() {
    let h = Harness::new().await;
    let mut item = h.listing(1, 100, Duration::seconds(30), Duration::hours(1));
    item.upsert_bid(bid(ALICE, "alice", 150, h.now()));
    h.auctions.insert(item).await;

    // 시작 전에는 아무 일도 없다
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.transitions(), 0);

    h.clock.advance(Duration::seconds(31));
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.auto_rejected, 1);

    let item = h.auction(1).await;
    assert_eq!(item.approval_status, ApprovalStatus::Rejected);
    assert_eq!(item.lifecycle_status, LifecycleStatus::Ended);
    assert!(item.is_processed);
    assert!(item.winner.is_none());
    assert_eq!(item.rejection_reason.as_deref(), Some(AUTO_REJECT_REASON));

    assert_eq!(h.count_of(SELLER, NotificationType::AutoRejected).await, 1);
    assert!(h.notifications_for(ALICE).await.is_empty());

    // 처리 완료된 경매는 더 이상 조회되지 않는다
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(h.count_of(SELLER, NotificationType::AutoRejected).await, 1);
}

/// 종료 시 최고가 입찰자가 낙찰되고, 동일 금액은 먼저 입찰한 쪽이 이긴다.
#[tokio::test]
async fn test_ended_auction_selects_earliest_highest_bid() {
    let h = Harness::new().await;
    let t0 = h.now();
    let mut item = h.listing(1, 100, Duration::minutes(-10), Duration::minutes(10));
    item.approval_status = ApprovalStatus::Approved;
    item.lifecycle_status = LifecycleStatus::Live;
    item.upsert_bid(bid(ALICE, "alice", 200, t0 - Duration::minutes(5)));
    item.upsert_bid(bid(BOB, "bob", 250, t0 - Duration::minutes(4)));
    item.upsert_bid(bid(CAROL, "carol", 250, t0 - Duration::minutes(3)));
    h.auctions.insert(item).await;

    h.clock.advance(Duration::minutes(10));
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);

    let item = h.auction(1).await;
    assert_eq!(item.lifecycle_status, LifecycleStatus::Ended);
    assert!(item.is_processed);
    let winner = item.winner.expect("낙찰자 없음");
    assert_eq!(winner.bidder_id, BOB);
    assert_eq!(winner.amount, 250);

    assert_eq!(h.count_of(BOB, NotificationType::AuctionWon).await, 1);
    assert_eq!(h.count_of(BOB, NotificationType::AuctionLost).await, 0);
    assert_eq!(h.count_of(ALICE, NotificationType::AuctionLost).await, 1);
    assert_eq!(h.count_of(CAROL, NotificationType::AuctionLost).await, 1);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionEnded).await, 1);

    // 낙찰 메일은 별도 태스크로 발송된다
    h.settle().await;
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.email, "bob@example.com");
    assert_eq!(sent[0].1.auction_id, 1);
    assert_eq!(sent[0].1.winning_bid, 250);

    // 재실행해도 알림과 메일이 중복되지 않는다
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 0);
    h.settle().await;
    assert_eq!(h.count_of(BOB, NotificationType::AuctionWon).await, 1);
    assert_eq!(h.mailer.sent().len(), 1);
}

/// 입찰 없이 종료되면 낙찰자 없이 판매자에게만 알린다.
#[tokio::test]
async fn test_ended_auction_without_bids() {
    let h = Harness::new().await;
    h.seed_live(1, 100).await;

    h.clock.advance(Duration::hours(2));
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);

    let item = h.auction(1).await;
    assert!(item.winner.is_none());
    assert_eq!(item.current_bid, 100);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionEnded).await, 1);

    h.settle().await;
    assert!(h.mailer.sent().is_empty());
}

/// LIVE 를 거치지 못하고 종료 시간이 지나면 바로 종료된다.
#[tokio::test]
async fn test_end_takes_priority_over_go_live() {
    let h = Harness::new().await;
    let mut item = h.listing(1, 100, Duration::minutes(1), Duration::minutes(2));
    item.approval_status = ApprovalStatus::Approved;
    h.auctions.insert(item).await;

    h.clock.advance(Duration::minutes(5));
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);
    assert_eq!(report.went_live, 0);

    let item = h.auction(1).await;
    assert_eq!(item.lifecycle_status, LifecycleStatus::Ended);
    assert!(item.is_processed);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionLive).await, 0);
}

/// 한 경매의 저장 실패는 다른 경매의 전이를 막지 않는다.
#[tokio::test]
async fn test_failure_of_one_auction_is_isolated() {
    let h = Harness::with_store(|inner| {
        Arc::new(BrokenForOne {
            inner,
            broken_id: 1,
        })
    })
    .await;
    for id in [1, 2] {
        let mut item = h.listing(id, 100, Duration::seconds(-1), Duration::hours(1));
        item.approval_status = ApprovalStatus::Approved;
        h.auctions.insert(item).await;
    }

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.went_live, 1);

    assert_eq!(h.auction(1).await.lifecycle_status, LifecycleStatus::Upcoming);
    assert_eq!(h.auction(2).await.lifecycle_status, LifecycleStatus::Live);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionLive).await, 1);
}

/// 버전 충돌로 밀린 전이는 부수 효과 없이 다음 틱에 적용된다.
#[tokio::test]
async fn test_conflicting_transition_is_deferred_to_next_tick() {
    let h = Harness::with_store(|inner| {
        Arc::new(RacingWriter {
            inner,
            raced: AtomicBool::new(false),
        })
    })
    .await;
    let mut item = h.listing(1, 100, Duration::seconds(-1), Duration::hours(1));
    item.approval_status = ApprovalStatus::Approved;
    h.auctions.insert(item).await;

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.transitions(), 0);
    assert!(h.notifications_for(SELLER).await.is_empty());

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.went_live, 1);
    assert_eq!(h.auction(1).await.lifecycle_status, LifecycleStatus::Live);
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionLive).await, 1);
}

/// 메일 발송 실패는 종료 처리를 되돌리지 않는다.
#[tokio::test]
async fn test_mailer_failure_does_not_undo_close() {
    let h = Harness::new().await;
    let mut item = h.seed_live(1, 100).await;
    item.upsert_bid(bid(ALICE, "alice", 300, h.now()));
    h.auctions.insert(item).await;
    h.mailer.fail_next(true);

    h.clock.advance(Duration::hours(2));
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);
    assert_eq!(report.failed, 0);

    h.settle().await;
    let item = h.auction(1).await;
    assert!(item.is_processed);
    assert_eq!(item.winner.map(|w| w.bidder_id), Some(ALICE));
    assert_eq!(h.count_of(ALICE, NotificationType::AuctionWon).await, 1);
    assert!(h.mailer.sent().is_empty());
}

/// 관리자 강제 종료는 스케줄러 종료와 같은 결과를 낸다.
#[tokio::test]
async fn test_force_close_selects_winner() {
    let h = Harness::new().await;
    let mut item = h.seed_live(1, 100).await;
    item.upsert_bid(bid(ALICE, "alice", 150, h.now()));
    item.upsert_bid(bid(BOB, "bob", 180, h.now()));
    h.auctions.insert(item).await;

    let closed = h.state.scheduler.force_close(1).await.unwrap();
    assert_eq!(closed.lifecycle_status, LifecycleStatus::Ended);
    assert!(closed.is_processed);
    assert_eq!(closed.winner.as_ref().map(|w| w.bidder_id), Some(BOB));
    assert_eq!(h.count_of(BOB, NotificationType::AuctionWon).await, 1);
    assert_eq!(h.count_of(ALICE, NotificationType::AuctionLost).await, 1);

    // 이미 종료된 경매는 다시 닫을 수 없다
    let err = h.state.scheduler.force_close(1).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    // 스케줄러도 다시 처리하지 않는다
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 0);
}

/// 백그라운드 루프가 주기적으로 틱을 실행한다.
#[tokio::test]
async fn test_started_scheduler_applies_transitions() {
    let h = Harness::with_config(Config {
        scheduler: SchedulerConfig {
            tick_interval: std::time::Duration::from_millis(10),
            item_timeout: std::time::Duration::from_secs(1),
        },
        ..Config::default()
    })
    .await;
    let mut item = h.listing(1, 100, Duration::seconds(-1), Duration::hours(1));
    item.approval_status = ApprovalStatus::Approved;
    h.auctions.insert(item).await;

    let handle = Arc::clone(&h.state.scheduler).start();
    let mut live = false;
    for _ in 0..100 {
        if h.auction(1).await.lifecycle_status == LifecycleStatus::Live {
            live = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    handle.abort();

    assert!(live, "스케줄러가 경매를 시작하지 않았습니다");
    assert_eq!(h.count_of(SELLER, NotificationType::AuctionLive).await, 1);
}

/// 종료 저장이 실패하면 상태도 알림도 남지 않고, 다음 틱에 한 번만 적용된다.
#[tokio::test]
async fn test_failed_close_is_retried_with_notifications_exactly_once() {
    let h = Harness::with_store(|inner| {
        Arc::new(FailsOnceOnWin {
            inner,
            failed: AtomicBool::new(false),
        })
    })
    .await;
    seed_contested_and_expire(&h).await;
    let (connection, mut rx) = h.state.channels.connect();
    h.state.channels.subscribe(connection, Topic::User(BOB));

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.ended, 0);

    let item = h.auction(1).await;
    assert_eq!(item.lifecycle_status, LifecycleStatus::Live);
    assert!(!item.is_processed);
    assert!(item.winner.is_none());
    assert!(h.notifications.all().await.is_empty());
    assert!(rx.try_recv().is_err());
    h.settle().await;
    assert!(h.mailer.sent().is_empty());

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);
    assert_eq!(report.failed, 0);

    let item = h.auction(1).await;
    assert!(item.is_processed);
    assert_eq!(item.winner.map(|w| w.bidder_id), Some(BOB));
    assert_close_notified_once(&h).await;

    let message = rx.try_recv().expect("낙찰 푸시 없음");
    assert_eq!(message.event, "notification");
    assert_eq!(message.payload["notification_type"], "AUCTION_WON");
    assert!(rx.try_recv().is_err());

    h.settle().await;
    assert_eq!(h.mailer.sent().len(), 1);

    // 처리 완료 후에는 다시 실행되지 않는다
    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.scanned, 0);
    h.settle().await;
    assert_close_notified_once(&h).await;
    assert_eq!(h.mailer.sent().len(), 1);
}

/// 시간 초과된 종료는 흔적 없이 취소되고 다음 틱에 한 번만 적용된다.
#[tokio::test]
async fn test_timed_out_close_leaves_nothing_behind() {
    let h = Harness::with_store_and_config(
        |inner| {
            Arc::new(StallsOnce {
                inner,
                stalled: AtomicBool::new(false),
                delay: std::time::Duration::from_millis(300),
            })
        },
        Config {
            scheduler: SchedulerConfig {
                tick_interval: std::time::Duration::from_secs(1),
                item_timeout: std::time::Duration::from_millis(50),
            },
            ..Config::default()
        },
    )
    .await;
    seed_contested_and_expire(&h).await;

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.auction(1).await.lifecycle_status, LifecycleStatus::Live);
    assert!(h.notifications.all().await.is_empty());

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);
    assert!(h.auction(1).await.is_processed);
    assert_close_notified_once(&h).await;

    h.settle().await;
    assert_eq!(h.mailer.sent().len(), 1);
}

/// 전이 알림은 경매 저장과 함께 기록되므로 단독 알림 쓰기 장애의 영향을 받지 않는다.
#[tokio::test]
async fn test_close_notifications_commit_with_the_transition() {
    let h = Harness::with_notification_store(|inner| Arc::new(RejectingInserts { inner })).await;
    seed_contested_and_expire(&h).await;

    let report = h.state.scheduler.tick().await.unwrap();
    assert_eq!(report.ended, 1);
    assert_eq!(report.failed, 0);
    assert_close_notified_once(&h).await;

    // 조회는 같은 저장소를 본다
    let listed = h.state.notifier.list(BOB).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].notification_type, NotificationType::AuctionWon);
}
