/// 인증 주체 및 사용자 모델
/// 인증 자체는 외부 ID 서비스가 담당하며, 여기서는 전달받은 주체만 다룬다.
// region:    --- Imports
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

// endregion: --- Imports

// region:    --- Role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Seller,
    Bidder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Seller => "SELLER",
            Role::Bidder => "BIDDER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "SELLER" => Ok(Role::Seller),
            "BIDDER" | "USER" => Ok(Role::Bidder),
            other => Err(AppError::Validation(format!("알 수 없는 역할: {other}"))),
        }
    }
}
// endregion: --- Role

// region:    --- Principal
/// 요청마다 전달되는 인증 주체
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: i64, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "관리자만 수행할 수 있습니다 (user={})",
                self.id
            )))
        }
    }
}

/// 사용자 디렉터리에서 조회되는 사용자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl User {
    /// 알 수 없는 역할은 권한이 가장 낮은 Bidder 로 취급한다.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_else(|_| {
            warn!(
                "{:<12} --> 사용자 {} 의 알 수 없는 역할 {:?}: BIDDER 로 취급",
                "Principal", self.id, self.role
            );
            Role::Bidder
        })
    }
}

// endregion: --- Principal
