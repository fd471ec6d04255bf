/// 경매 관련 커맨드 처리
/// 1. 판매자: 등록 / 수정(거절 시 재등록) / 삭제
/// 2. 관리자: 승인 / 거절 / 강제 종료
/// 3. 조회
/// 상태 변경과 그에 따른 알림은 한 번의 버전 비교 저장으로 함께 커밋한다.
// region:    --- Imports
use super::events::AuctionEvent;
use super::model::{AuctionItem, NewAuction};
use super::state;
use crate::channel::ChannelRegistry;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::notification::model::{NewNotification, NotificationType};
use crate::notification::{NotificationContent, NotificationService};
use crate::principal::{Principal, Role};
use crate::scheduler::TransitionScheduler;
use crate::store::{AuctionStore, Committed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands
/// 경매 등록 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starting_bid: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// 경매 수정 명령 (지정한 필드만 변경)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EditAuctionCommand {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starting_bid: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

// 버전 충돌 시 최대 재시도 횟수
const MAX_CAS_RETRIES: u32 = 10;

pub struct AuctionService {
    auctions: Arc<dyn AuctionStore>,
    notifier: Arc<NotificationService>,
    channels: Arc<ChannelRegistry>,
    scheduler: Arc<TransitionScheduler>,
    clock: Arc<dyn Clock>,
}

fn validate_listing(
    title: &str,
    starting_bid: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("제목이 비어 있습니다.".to_string()));
    }
    if starting_bid <= 0 {
        return Err(AppError::Validation(
            "시작가는 0보다 커야 합니다.".to_string(),
        ));
    }
    if end_time <= start_time {
        return Err(AppError::Validation(
            "종료 시간은 시작 시간 이후여야 합니다.".to_string(),
        ));
    }
    if start_time <= now {
        return Err(AppError::Validation(
            "시작 시간은 현재 이후여야 합니다.".to_string(),
        ));
    }
    Ok(())
}

fn require_owner(item: &AuctionItem, principal: &Principal) -> AppResult<()> {
    if item.created_by == principal.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "경매 {} 의 판매자가 아닙니다 (user={})",
            item.id, principal.id
        )))
    }
}

impl AuctionService {
    pub fn new(
        auctions: Arc<dyn AuctionStore>,
        notifier: Arc<NotificationService>,
        channels: Arc<ChannelRegistry>,
        scheduler: Arc<TransitionScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auctions,
            notifier,
            channels,
            scheduler,
            clock,
        }
    }

    async fn load(&self, id: i64) -> AppResult<AuctionItem> {
        self.auctions
            .get(id)
            .await?
            .ok_or(AppError::AuctionNotFound(id))
    }

    /// 읽기 -> 변경 -> 알림 초안 -> 버전 비교 저장. 충돌 시 다시 읽어서 재시도
    /// 커밋된 알림은 호출자가 deliver 로 푸시한다.
    async fn modify<F, D>(
        &self,
        id: i64,
        mut change: F,
        draft: D,
    ) -> AppResult<(AuctionItem, Committed)>
    where
        F: FnMut(&mut AuctionItem) -> AppResult<()> + Send,
        D: Fn(&AuctionItem, &AuctionItem) -> Vec<NewNotification> + Send,
    {
        for attempt in 1..=MAX_CAS_RETRIES {
            let before = self.load(id).await?;
            let mut next = before.clone();
            change(&mut next)?;
            let outbox = draft(&before, &next);
            if let Some(committed) = self.auctions.compare_and_swap(&next, outbox).await? {
                return Ok((before, committed));
            }
            warn!(
                "{:<12} --> 경매 {} 버전 충돌: 재시도 ({}/{})",
                "Command", id, attempt, MAX_CAS_RETRIES
            );
        }
        Err(AppError::RetriesExhausted)
    }

    /// 1. 경매 등록
    pub async fn create(
        &self,
        principal: &Principal,
        cmd: CreateAuctionCommand,
    ) -> AppResult<AuctionItem> {
        info!("{:<12} --> 경매 등록 요청: {:?}", "Command", cmd);
        validate_listing(
            &cmd.title,
            cmd.starting_bid,
            cmd.start_time,
            cmd.end_time,
            self.clock.now(),
        )?;

        let item = self
            .auctions
            .create(NewAuction {
                title: cmd.title.trim().to_string(),
                description: cmd.description,
                starting_bid: cmd.starting_bid,
                start_time: cmd.start_time,
                end_time: cmd.end_time,
                created_by: principal.id,
            })
            .await?;

        self.notifier
            .notify_admins(
                NotificationContent::new(
                    NotificationType::NewAuctionPending,
                    "New auction awaiting approval",
                    format!("\"{}\" was submitted by {}.", item.title, principal.name),
                )
                .about(&item),
            )
            .await?;
        Ok(item)
    }

    /// 2. 경매 수정 (거절된 경매는 재등록)
    pub async fn edit(
        &self,
        principal: &Principal,
        id: i64,
        cmd: EditAuctionCommand,
    ) -> AppResult<AuctionItem> {
        info!("{:<12} --> 경매 수정 요청 id: {}", "Command", id);
        let now = self.clock.now();
        let admins = self.notifier.admin_ids().await?;
        let (before, committed) = self
            .modify(
                id,
                |item| {
                    require_owner(item, principal)?;
                    state::check_editable(item)?;

                    if let Some(title) = &cmd.title {
                        item.title = title.trim().to_string();
                    }
                    if let Some(description) = &cmd.description {
                        item.description = description.clone();
                    }
                    if let Some(starting_bid) = cmd.starting_bid {
                        item.starting_bid = starting_bid;
                    }
                    if let Some(start_time) = cmd.start_time {
                        item.start_time = start_time;
                    }
                    if let Some(end_time) = cmd.end_time {
                        item.end_time = end_time;
                    }
                    validate_listing(
                        &item.title,
                        item.starting_bid,
                        item.start_time,
                        item.end_time,
                        now,
                    )?;

                    if item.approval_status == state::ApprovalStatus::Rejected {
                        item.restart();
                    } else {
                        item.current_bid = item.starting_bid;
                    }
                    Ok(())
                },
                |before, next| {
                    if before.approval_status != state::ApprovalStatus::Rejected {
                        return Vec::new();
                    }
                    let content = NotificationContent::new(
                        NotificationType::AuctionResubmitted,
                        "Auction resubmitted",
                        format!("\"{}\" was resubmitted for approval.", next.title),
                    )
                    .about(next);
                    admins
                        .iter()
                        .map(|admin_id| self.notifier.draft(*admin_id, Role::Admin, content.clone()))
                        .collect()
                },
            )
            .await?;

        let saved = committed.item;
        if before.approval_status == state::ApprovalStatus::Rejected {
            info!("{:<12} --> 거절된 경매 {} 재등록", "Command", saved.id);
            self.notifier.deliver(&committed.notifications);
            self.channels
                .publish_auction_event(&AuctionEvent::approval_of(&saved));
            self.channels
                .publish_auction_event(&AuctionEvent::status_of(&saved));
        }
        Ok(saved)
    }

    /// 3. 경매 삭제 (승인 전만)
    pub async fn delete(&self, principal: &Principal, id: i64) -> AppResult<()> {
        info!("{:<12} --> 경매 삭제 요청 id: {}", "Command", id);
        for attempt in 1..=MAX_CAS_RETRIES {
            let item = self.load(id).await?;
            require_owner(&item, principal)?;
            state::check_deletable(&item)?;
            if self.auctions.delete(id, item.version).await? {
                return Ok(());
            }
            warn!(
                "{:<12} --> 경매 {} 삭제 충돌: 재시도 ({}/{})",
                "Command", id, attempt, MAX_CAS_RETRIES
            );
        }
        Err(AppError::RetriesExhausted)
    }

    /// 4. 관리자 승인
    pub async fn approve(&self, principal: &Principal, id: i64) -> AppResult<AuctionItem> {
        principal.require_admin()?;
        info!("{:<12} --> 경매 승인 id: {} (admin {})", "Command", id, principal.id);
        let (_, committed) = self
            .modify(
                id,
                |item| {
                    state::check_pending_decision(item)?;
                    item.approval_status = state::ApprovalStatus::Approved;
                    Ok(())
                },
                |_, next| {
                    let content = NotificationContent::new(
                        NotificationType::AuctionApproved,
                        "Auction approved",
                        format!(
                            "\"{}\" was approved and will go live at its start time.",
                            next.title
                        ),
                    )
                    .about(next);
                    vec![self.notifier.draft(next.created_by, Role::Seller, content)]
                },
            )
            .await?;

        self.notifier.deliver(&committed.notifications);
        self.channels
            .publish_auction_event(&AuctionEvent::approval_of(&committed.item));
        Ok(committed.item)
    }

    /// 5. 관리자 거절
    pub async fn reject(
        &self,
        principal: &Principal,
        id: i64,
        reason: String,
    ) -> AppResult<AuctionItem> {
        principal.require_admin()?;
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(AppError::Validation("거절 사유가 필요합니다.".to_string()));
        }
        info!("{:<12} --> 경매 거절 id: {} (admin {})", "Command", id, principal.id);
        let (_, committed) = self
            .modify(
                id,
                |item| {
                    state::check_pending_decision(item)?;
                    state::reject(item, reason.clone());
                    Ok(())
                },
                |_, next| {
                    let content = NotificationContent::new(
                        NotificationType::AuctionRejected,
                        "Auction rejected",
                        format!("\"{}\" was rejected: {}", next.title, reason),
                    )
                    .about(next);
                    vec![self.notifier.draft(next.created_by, Role::Seller, content)]
                },
            )
            .await?;

        let saved = committed.item;
        self.notifier.deliver(&committed.notifications);
        self.channels
            .publish_auction_event(&AuctionEvent::approval_of(&saved));
        self.channels
            .publish_auction_event(&AuctionEvent::status_of(&saved));
        Ok(saved)
    }

    /// 6. 관리자 강제 종료
    pub async fn force_close(&self, principal: &Principal, id: i64) -> AppResult<AuctionItem> {
        principal.require_admin()?;
        info!("{:<12} --> 경매 강제 종료 id: {} (admin {})", "Command", id, principal.id);
        self.scheduler.force_close(id).await
    }

    /// 경매 조회
    pub async fn get(&self, id: i64) -> AppResult<AuctionItem> {
        self.load(id).await
    }

    /// 모든 경매 조회
    pub async fn list(&self) -> AppResult<Vec<AuctionItem>> {
        self.auctions.list().await
    }
}
// endregion: --- Commands
