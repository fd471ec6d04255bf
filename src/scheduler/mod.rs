/// 경매 상태 전이 스케줄러
/// 고정 간격으로 미처리 경매(is_processed = false)를 조회하고 가드를 평가해 전이를 적용한다.
/// 1. 전이와 그 알림을 버전 비교 갱신(compare-and-swap) 한 번으로 함께 저장한다
/// 2. 커밋된 전이에 대해서만 푸시/방송/낙찰 메일을 실행한다 (실패해도 전이는 유지)
/// 저장이 실패하거나 시간 초과되면 아무것도 남지 않고, 해당 경매는 다음 틱에 다시 평가된다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::AuctionItem;
use crate::auction::state::{self, Transition};
use crate::channel::ChannelRegistry;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::mailer::{AuctionSummary, EmailRecipient, WinnerMailer};
use crate::notification::model::{NewNotification, NotificationType};
use crate::notification::{NotificationContent, NotificationService};
use crate::principal::Role;
use crate::store::{AuctionStore, Committed, UserDirectory};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Tick Report
/// 한 틱의 처리 결과
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub went_live: usize,
    pub ended: usize,
    pub auto_rejected: usize,
    /// 버전 충돌로 다음 틱으로 미룬 경매
    pub deferred: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn transitions(&self) -> usize {
        self.went_live + self.ended + self.auto_rejected
    }
}

enum Outcome {
    Idle,
    Applied(Transition, Committed),
    Deferred,
}

const FORCE_CLOSE_RETRIES: u32 = 10;
// endregion: --- Tick Report

// region:    --- Transition Scheduler
pub struct TransitionScheduler {
    auctions: Arc<dyn AuctionStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<NotificationService>,
    channels: Arc<ChannelRegistry>,
    mailer: Arc<dyn WinnerMailer>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl TransitionScheduler {
    pub fn new(
        auctions: Arc<dyn AuctionStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<NotificationService>,
        channels: Arc<ChannelRegistry>,
        mailer: Arc<dyn WinnerMailer>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            auctions,
            users,
            notifier,
            channels,
            mailer,
            clock,
            config,
        }
    }

    /// 스케줄러 시작
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "{:<12} --> 스케줄러 시작: 간격 {:?}",
                "Scheduler", self.config.tick_interval
            );
            loop {
                ticker.tick().await;
                match self.tick().await {
                    Ok(report) if report.transitions() > 0 || report.failed > 0 => {
                        info!("{:<12} --> 틱 완료: {:?}", "Scheduler", report)
                    }
                    Ok(_) => {}
                    Err(e) => error!(
                        "{:<12} --> 경매 상태 업데이트 중 오류 발생: {:?}",
                        "Scheduler", e
                    ),
                }
            }
        })
    }

    /// 한 틱 실행
    pub async fn tick(&self) -> AppResult<TickReport> {
        let now = self.clock.now();
        let items = self.auctions.list_unprocessed().await?;
        let mut report = TickReport {
            scanned: items.len(),
            ..TickReport::default()
        };

        for item in items {
            let id = item.id;
            // 시간 제한은 저장 단계에만 건다. 취소되면 트랜잭션째 버려진다.
            match timeout(self.config.item_timeout, self.commit_transition(item, now)).await {
                Ok(Ok(Outcome::Idle)) => {}
                Ok(Ok(Outcome::Applied(transition, committed))) => {
                    self.announce(transition, &committed);
                    match transition {
                        Transition::GoLive => report.went_live += 1,
                        Transition::End => report.ended += 1,
                        Transition::AutoReject => report.auto_rejected += 1,
                    }
                }
                Ok(Ok(Outcome::Deferred)) => report.deferred += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!("{:<12} --> 경매 {} 처리 실패: {:?}", "Scheduler", id, e);
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        "{:<12} --> 경매 {} 처리 시간 초과 ({:?})",
                        "Scheduler", id, self.config.item_timeout
                    );
                }
            }
        }

        debug!("{:<12} --> 틱 결과: {:?}", "Scheduler", report);
        Ok(report)
    }

    /// 경매 하나 평가 -> 전이와 알림을 함께 저장
    async fn commit_transition(&self, item: AuctionItem, now: DateTime<Utc>) -> AppResult<Outcome> {
        let Some(transition) = state::next_transition(&item, now) else {
            return Ok(Outcome::Idle);
        };

        let mut next = item;
        state::apply_transition(&mut next, transition);
        let outbox = self.notifications_for(&next, transition);

        let Some(committed) = self.auctions.compare_and_swap(&next, outbox).await? else {
            warn!(
                "{:<12} --> 경매 {} 버전 충돌: 다음 틱에 재평가",
                "Scheduler", next.id
            );
            return Ok(Outcome::Deferred);
        };

        info!(
            "{:<12} --> 경매 {} 전이 {:?} -> ({}, {}), 알림 {}건",
            "Scheduler",
            committed.item.id,
            transition,
            committed.item.approval_status,
            committed.item.lifecycle_status,
            committed.notifications.len()
        );
        Ok(Outcome::Applied(transition, committed))
    }

    /// 전이 후 상태의 경매를 기준으로 수신자별 알림을 만든다.
    fn notifications_for(&self, item: &AuctionItem, transition: Transition) -> Vec<NewNotification> {
        match transition {
            Transition::GoLive => {
                // Upcoming -> Live: 기존 입찰자와 판매자
                let content = NotificationContent::new(
                    NotificationType::AuctionLive,
                    "Auction is Live",
                    format!("\"{}\" is now open for bidding.", item.title),
                )
                .about(item);
                let mut outbox = self
                    .notifier
                    .draft_bidders(item, Some(item.created_by), &content);
                outbox.push(self.notifier.draft(item.created_by, Role::Seller, content));
                outbox
            }
            Transition::AutoReject => {
                let reason = item
                    .rejection_reason
                    .as_deref()
                    .unwrap_or(state::AUTO_REJECT_REASON);
                let content = NotificationContent::new(
                    NotificationType::AutoRejected,
                    "Auction automatically rejected",
                    format!("\"{}\" was rejected: {}", item.title, reason),
                )
                .about(item);
                vec![self.notifier.draft(item.created_by, Role::Seller, content)]
            }
            Transition::End => match &item.winner {
                Some(winner) => {
                    let won = NotificationContent::new(
                        NotificationType::AuctionWon,
                        "You won the auction",
                        format!("Your bid of {} won \"{}\".", winner.amount, item.title),
                    )
                    .about(item);
                    let lost = NotificationContent::new(
                        NotificationType::AuctionLost,
                        "Auction ended",
                        format!(
                            "\"{}\" was won by another bidder at {}.",
                            item.title, winner.amount
                        ),
                    )
                    .about(item);
                    let summary = NotificationContent::new(
                        NotificationType::AuctionEnded,
                        "Your auction has ended",
                        format!(
                            "\"{}\" sold to {} for {}.",
                            item.title, winner.bidder_name, winner.amount
                        ),
                    )
                    .about(item);

                    let mut outbox = vec![self.notifier.draft(winner.bidder_id, Role::Bidder, won)];
                    outbox.extend(
                        self.notifier
                            .draft_bidders(item, Some(winner.bidder_id), &lost),
                    );
                    outbox.push(self.notifier.draft(item.created_by, Role::Seller, summary));
                    outbox
                }
                None => {
                    let summary = NotificationContent::new(
                        NotificationType::AuctionEnded,
                        "Your auction has ended",
                        format!("\"{}\" ended without any bids.", item.title),
                    )
                    .about(item);
                    vec![self.notifier.draft(item.created_by, Role::Seller, summary)]
                }
            },
        }
    }

    /// 커밋된 전이의 푸시, 상태 방송, 낙찰 메일. 모두 실패해도 전이는 되돌리지 않는다.
    fn announce(&self, transition: Transition, committed: &Committed) {
        let item = &committed.item;
        self.notifier.deliver(&committed.notifications);

        if transition == Transition::AutoReject {
            self.channels
                .publish_auction_event(&AuctionEvent::approval_of(item));
        }
        self.channels
            .publish_auction_event(&AuctionEvent::status_of(item));

        if transition == Transition::End {
            if let Some(winner) = &item.winner {
                self.send_winner_email(item, winner.bidder_id, winner.amount);
            }
        }
    }

    /// 낙찰 메일 (별도 태스크, 시간 제한, 실패는 로그만 남긴다)
    fn send_winner_email(&self, item: &AuctionItem, winner_id: i64, amount: i64) {
        let users = Arc::clone(&self.users);
        let mailer = Arc::clone(&self.mailer);
        let summary = AuctionSummary::of(item, amount);
        let limit = self.config.item_timeout;

        tokio::spawn(async move {
            let send = async {
                let user = users
                    .get(winner_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("사용자 {winner_id}")))?;
                let recipient = EmailRecipient {
                    user_id: user.id,
                    name: user.name,
                    email: user.email,
                };
                mailer.send_winner_email(&recipient, &summary).await
            };
            match timeout(limit, send).await {
                Ok(Ok(())) => info!(
                    "{:<12} --> 낙찰 메일 발송: auction={}, user={}",
                    "Mailer", summary.auction_id, winner_id
                ),
                Ok(Err(e)) => warn!(
                    "{:<12} --> 낙찰 메일 실패 (무시): auction={}, {:?}",
                    "Mailer", summary.auction_id, e
                ),
                Err(_) => warn!(
                    "{:<12} --> 낙찰 메일 시간 초과 (무시): auction={}",
                    "Mailer", summary.auction_id
                ),
            }
        });
    }

    /// 관리자 강제 종료: (Approved, Live) -> (Approved, Ended)
    /// 스케줄러 종료와 같은 승자 선정, 알림 저장, 부수 효과를 따른다.
    pub async fn force_close(&self, auction_id: i64) -> AppResult<AuctionItem> {
        for attempt in 1..=FORCE_CLOSE_RETRIES {
            let item = self
                .auctions
                .get(auction_id)
                .await?
                .ok_or(AppError::AuctionNotFound(auction_id))?;
            state::check_force_close(&item)?;

            let mut next = item;
            state::close(&mut next);
            let outbox = self.notifications_for(&next, Transition::End);
            match self.auctions.compare_and_swap(&next, outbox).await? {
                Some(committed) => {
                    info!("{:<12} --> 경매 {} 강제 종료", "Scheduler", committed.item.id);
                    self.announce(Transition::End, &committed);
                    return Ok(committed.item);
                }
                None => warn!(
                    "{:<12} --> 강제 종료 버전 충돌: 재시도 ({}/{})",
                    "Scheduler", attempt, FORCE_CLOSE_RETRIES
                ),
            }
        }
        Err(AppError::RetriesExhausted)
    }
}
// endregion: --- Transition Scheduler
