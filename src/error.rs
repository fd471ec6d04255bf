/// 서비스 공통 에러 타입
/// 모든 커맨드/쿼리/스케줄러 경로는 AppError 로 실패를 전달한다.
// region:    --- Imports
use crate::auction::state::LifecycleStatus;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Error Kind
/// 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    Authorization,
    TransientIo,
}
// endregion: --- Error Kind

// region:    --- App Error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("잘못된 요청입니다: {0}")]
    Validation(String),

    #[error("경매를 찾을 수 없습니다: {0}")]
    AuctionNotFound(i64),

    #[error("{0}을(를) 찾을 수 없습니다.")]
    NotFound(String),

    #[error("진행 중인 경매가 아닙니다: id={id}, status={status}")]
    AuctionNotLive { id: i64, status: LifecycleStatus },

    #[error("입찰 금액이 현재 가격보다 낮습니다: bid={amount}, current={current}")]
    BidTooLow { amount: i64, current: i64 },

    #[error("현재 상태에서 허용되지 않는 요청입니다: {0}")]
    StateConflict(String),

    #[error("권한이 없습니다: {0}")]
    Forbidden(String),

    #[error("일시적인 I/O 오류: {0}")]
    TransientIo(String),

    #[error("최대 재시도 횟수 초과")]
    RetriesExhausted,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::BidTooLow { .. } => ErrorKind::Validation,
            AppError::AuctionNotFound(_) | AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::AuctionNotLive { .. } | AppError::StateConflict(_) => {
                ErrorKind::StateConflict
            }
            AppError::Forbidden(_) => ErrorKind::Authorization,
            AppError::TransientIo(_) | AppError::RetriesExhausted => ErrorKind::TransientIo,
        }
    }

    /// 클라이언트에 노출되는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION",
            AppError::AuctionNotFound(_) => "AUCTION_NOT_FOUND",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AuctionNotLive { .. } => "AUCTION_NOT_LIVE",
            AppError::BidTooLow { .. } => "LOW_BID",
            AppError::StateConflict(_) => "STATE_CONFLICT",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::TransientIo(_) => "TRANSIENT_IO",
            AppError::RetriesExhausted => "MAX_RETRIES_EXCEEDED",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("요청한 레코드".to_string()),
            other => AppError::TransientIo(other.to_string()),
        }
    }
}

impl From<rdkafka::error::KafkaError> for AppError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        AppError::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::TransientIo(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
// endregion: --- App Error
