/// 경매 등록
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (title, description, starting_bid, current_bid, start_time, end_time, created_by, created_at)
    VALUES ($1, $2, $3, $3, $4, $5, $6, $7)
    RETURNING id, title, description, starting_bid, current_bid, highest_bidder, start_time, end_time,
              approval_status, lifecycle_status, is_processed, rejection_reason,
              winner_id, winner_name, winner_amount, created_by, created_at, version
"#;

/// 경매 조회
pub const GET_AUCTION: &str = r#"
    SELECT id, title, description, starting_bid, current_bid, highest_bidder, start_time, end_time,
           approval_status, lifecycle_status, is_processed, rejection_reason,
           winner_id, winner_name, winner_amount, created_by, created_at, version
    FROM auctions
    WHERE id = $1
"#;

/// 모든 경매 조회
pub const LIST_AUCTIONS: &str = r#"
    SELECT id, title, description, starting_bid, current_bid, highest_bidder, start_time, end_time,
           approval_status, lifecycle_status, is_processed, rejection_reason,
           winner_id, winner_name, winner_amount, created_by, created_at, version
    FROM auctions
    ORDER BY created_at DESC, id DESC
"#;

/// 미처리 경매 조회
pub const LIST_UNPROCESSED_AUCTIONS: &str = r#"
    SELECT id, title, description, starting_bid, current_bid, highest_bidder, start_time, end_time,
           approval_status, lifecycle_status, is_processed, rejection_reason,
           winner_id, winner_name, winner_amount, created_by, created_at, version
    FROM auctions
    WHERE is_processed = FALSE
    ORDER BY id
"#;

/// 경매 입찰 조회
pub const GET_BIDS: &str = r#"
    SELECT bidder_id, bidder_name, amount, timestamp
    FROM bids
    WHERE auction_id = $1
    ORDER BY timestamp, bidder_id
"#;

/// 여러 경매의 입찰 조회
pub const GET_BIDS_FOR_AUCTIONS: &str = r#"
    SELECT auction_id, bidder_id, bidder_name, amount, timestamp
    FROM bids
    WHERE auction_id = ANY($1)
    ORDER BY timestamp, bidder_id
"#;

/// 조건부 현재가 갱신 (쓰기 시점 조건 확인)
pub const APPLY_BID_PRICE: &str = r#"
    UPDATE auctions
    SET current_bid = $2, highest_bidder = $3, version = version + 1
    WHERE id = $1
      AND approval_status = 'APPROVED'
      AND lifecycle_status = 'LIVE'
      AND is_processed = FALSE
      AND end_time > $4
      AND (current_bid < $2 OR (highest_bidder IS NULL AND $2 >= starting_bid))
    RETURNING id
"#;

/// 입찰자별 입찰 upsert
pub const UPSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, bidder_name, amount, timestamp)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (auction_id, bidder_id)
    DO UPDATE SET bidder_name = EXCLUDED.bidder_name, amount = EXCLUDED.amount, timestamp = EXCLUDED.timestamp
"#;

/// 버전 일치 시 경매 교체
pub const COMPARE_AND_SWAP_AUCTION: &str = r#"
    UPDATE auctions
    SET title = $2, description = $3, starting_bid = $4, current_bid = $5, highest_bidder = $6,
        start_time = $7, end_time = $8, approval_status = $9, lifecycle_status = $10,
        is_processed = $11, rejection_reason = $12,
        winner_id = $13, winner_name = $14, winner_amount = $15,
        version = version + 1
    WHERE id = $1 AND version = $16
    RETURNING version
"#;

/// 목록에 없는 입찰 삭제 (재등록 시 초기화)
pub const PRUNE_BIDS: &str =
    "DELETE FROM bids WHERE auction_id = $1 AND NOT (bidder_id = ANY($2))";

/// 버전 일치 시 경매 삭제
pub const DELETE_AUCTION: &str = "DELETE FROM auctions WHERE id = $1 AND version = $2";

/// 알림 생성
pub const INSERT_NOTIFICATION: &str = r#"
    INSERT INTO notifications (recipient_id, recipient_role, notification_type, title, message, auction_id, auction_title, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id, recipient_id, recipient_role, notification_type, title, message, auction_id, auction_title, is_read, created_at
"#;

/// 수신자 알림 조회
pub const LIST_NOTIFICATIONS: &str = r#"
    SELECT id, recipient_id, recipient_role, notification_type, title, message, auction_id, auction_title, is_read, created_at
    FROM notifications
    WHERE recipient_id = $1
    ORDER BY created_at DESC, id DESC
"#;

/// 읽지 않은 알림 수
pub const COUNT_UNREAD_NOTIFICATIONS: &str =
    "SELECT COUNT(*) AS unread FROM notifications WHERE recipient_id = $1 AND is_read = FALSE";

/// 알림 읽음 처리
pub const MARK_NOTIFICATION_READ: &str =
    "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2";

/// 모든 알림 읽음 처리
pub const MARK_ALL_NOTIFICATIONS_READ: &str =
    "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE";

/// 알림 비우기
pub const CLEAR_NOTIFICATIONS: &str = "DELETE FROM notifications WHERE recipient_id = $1";

/// 사용자 조회
pub const GET_USER: &str = "SELECT id, name, email, role FROM users WHERE id = $1";

/// 관리자 조회
pub const LIST_ADMINS: &str =
    "SELECT id, name, email, role FROM users WHERE UPPER(role) = 'ADMIN' ORDER BY id";
