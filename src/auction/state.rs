/// 경매 상태 머신
/// 승인 상태(Pending/Approved/Rejected)와 진행 상태(Upcoming/Live/Ended)의 조합,
/// 그리고 각 전이의 가드를 정의한다.
///
/// 도달 가능한 상태
///   (Pending,Upcoming) -> (Approved,Upcoming) -> (Approved,Live) -> (Approved,Ended)
///   (Pending,Upcoming) -> (Rejected,Ended)   [자동 거절 / 관리자 거절]
///
/// is_processed 가 true 인 경매는 어떤 가드도 통과하지 않는다.
// region:    --- Imports
use super::model::{AuctionItem, BidRecord, WinnerRecord};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// endregion: --- Imports

// region:    --- Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(AppError::Validation(format!("알 수 없는 승인 상태: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Upcoming,
    Live,
    Ended,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Upcoming => "UPCOMING",
            LifecycleStatus::Live => "LIVE",
            LifecycleStatus::Ended => "ENDED",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPCOMING" => Ok(LifecycleStatus::Upcoming),
            "LIVE" => Ok(LifecycleStatus::Live),
            "ENDED" => Ok(LifecycleStatus::Ended),
            other => Err(AppError::Validation(format!("알 수 없는 경매 상태: {other}"))),
        }
    }
}
// endregion: --- Status

// region:    --- Transitions
/// 스케줄러가 적용하는 전이
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Live -> Ended (승자 선정)
    End,
    /// Upcoming -> Live
    GoLive,
    /// 승인되지 않은 채 시작 시간 도달
    AutoReject,
}

pub const AUTO_REJECT_REASON: &str = "시작 시간까지 관리자 승인이 이루어지지 않았습니다.";

fn can_end(item: &AuctionItem, now: DateTime<Utc>) -> bool {
    item.approval_status == ApprovalStatus::Approved
        && now >= item.end_time
        && item.lifecycle_status != LifecycleStatus::Ended
}

fn can_go_live(item: &AuctionItem, now: DateTime<Utc>) -> bool {
    item.approval_status == ApprovalStatus::Approved
        && now >= item.start_time
        && now < item.end_time
        && item.lifecycle_status == LifecycleStatus::Upcoming
}

fn can_auto_reject(item: &AuctionItem, now: DateTime<Utc>) -> bool {
    !matches!(
        item.approval_status,
        ApprovalStatus::Approved | ApprovalStatus::Rejected
    ) && now >= item.start_time
}

/// 우선순위(End > GoLive > AutoReject)에 따라 적용할 전이 하나를 고른다.
pub fn next_transition(item: &AuctionItem, now: DateTime<Utc>) -> Option<Transition> {
    if item.is_processed {
        return None;
    }
    if can_end(item, now) {
        Some(Transition::End)
    } else if can_go_live(item, now) {
        Some(Transition::GoLive)
    } else if can_auto_reject(item, now) {
        Some(Transition::AutoReject)
    } else {
        None
    }
}

/// 전이를 아이템에 적용한다. 가드는 호출자가 이미 확인했다고 가정한다.
pub fn apply_transition(item: &mut AuctionItem, transition: Transition) {
    match transition {
        Transition::GoLive => {
            item.lifecycle_status = LifecycleStatus::Live;
        }
        Transition::AutoReject => {
            item.approval_status = ApprovalStatus::Rejected;
            item.lifecycle_status = LifecycleStatus::Ended;
            item.rejection_reason = Some(AUTO_REJECT_REASON.to_string());
            item.is_processed = true;
        }
        Transition::End => close(item),
    }
}

/// 종료 처리: 승자 선정 후 처리 완료 래치를 건다.
pub fn close(item: &mut AuctionItem) {
    item.lifecycle_status = LifecycleStatus::Ended;
    item.winner = select_winner(&item.bids);
    item.is_processed = true;
}

/// 관리자 거절: 자동 거절과 같은 종료 상태로 보낸다.
pub fn reject(item: &mut AuctionItem, reason: String) {
    item.approval_status = ApprovalStatus::Rejected;
    item.lifecycle_status = LifecycleStatus::Ended;
    item.rejection_reason = Some(reason);
    item.is_processed = true;
}

/// 금액 내림차순, 동일 금액은 먼저 도달한 입찰 우선
pub fn rank_bids(bids: &[BidRecord]) -> Vec<&BidRecord> {
    let mut ranked: Vec<&BidRecord> = bids.iter().collect();
    ranked.sort_by(|a, b| match b.amount.cmp(&a.amount) {
        Ordering::Equal => a.timestamp.cmp(&b.timestamp),
        other => other,
    });
    ranked
}

pub fn select_winner(bids: &[BidRecord]) -> Option<WinnerRecord> {
    rank_bids(bids).first().map(|top| WinnerRecord {
        bidder_id: top.bidder_id,
        bidder_name: top.bidder_name.clone(),
        amount: top.amount,
    })
}
// endregion: --- Transitions

// region:    --- Guards
/// 입찰 가능 여부 검증
pub fn check_bid(
    item: &AuctionItem,
    bidder_id: i64,
    amount: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::Validation(
            "입찰 금액은 0보다 커야 합니다.".to_string(),
        ));
    }
    if item.created_by == bidder_id {
        return Err(AppError::Validation(
            "판매자는 자신의 경매에 입찰할 수 없습니다.".to_string(),
        ));
    }
    let live = item.approval_status == ApprovalStatus::Approved
        && item.lifecycle_status == LifecycleStatus::Live
        && !item.is_processed
        && now < item.end_time;
    if !live {
        let status = if now >= item.end_time {
            LifecycleStatus::Ended
        } else {
            item.lifecycle_status
        };
        return Err(AppError::AuctionNotLive {
            id: item.id,
            status,
        });
    }
    if amount < item.starting_bid {
        return Err(AppError::BidTooLow {
            amount,
            current: item.starting_bid,
        });
    }
    if item.has_bids() && amount <= item.current_bid {
        return Err(AppError::BidTooLow {
            amount,
            current: item.current_bid,
        });
    }
    Ok(())
}

/// 판매자 수정 가능 여부: 승인 전 Upcoming 이거나 거절된 경매
pub fn check_editable(item: &AuctionItem) -> AppResult<()> {
    let unapproved_upcoming = item.approval_status == ApprovalStatus::Pending
        && item.lifecycle_status == LifecycleStatus::Upcoming;
    if unapproved_upcoming || item.approval_status == ApprovalStatus::Rejected {
        Ok(())
    } else {
        Err(AppError::StateConflict(format!(
            "수정할 수 없는 경매 상태입니다 ({}, {})",
            item.approval_status, item.lifecycle_status
        )))
    }
}

/// 삭제는 승인되지 않은 경매만 가능
pub fn check_deletable(item: &AuctionItem) -> AppResult<()> {
    if item.approval_status == ApprovalStatus::Approved {
        Err(AppError::StateConflict(
            "승인된 경매는 삭제할 수 없습니다.".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// 관리자 결정(승인/거절)은 대기 중인 Upcoming 경매에만 가능
pub fn check_pending_decision(item: &AuctionItem) -> AppResult<()> {
    if item.approval_status == ApprovalStatus::Pending
        && item.lifecycle_status == LifecycleStatus::Upcoming
        && !item.is_processed
    {
        Ok(())
    } else {
        Err(AppError::StateConflict(format!(
            "승인 대기 중인 경매가 아닙니다 ({}, {})",
            item.approval_status, item.lifecycle_status
        )))
    }
}

/// 강제 종료는 (Approved, Live) 에서만 가능
pub fn check_force_close(item: &AuctionItem) -> AppResult<()> {
    if item.approval_status == ApprovalStatus::Approved
        && item.lifecycle_status == LifecycleStatus::Live
        && !item.is_processed
    {
        Ok(())
    } else {
        Err(AppError::StateConflict(format!(
            "진행 중인 경매만 강제 종료할 수 있습니다 ({}, {})",
            item.approval_status, item.lifecycle_status
        )))
    }
}
// endregion: --- Guards
