// region:    --- Imports
use auction_lifecycle::app::{AppState, Backends};
use auction_lifecycle::clock::SystemClock;
use auction_lifecycle::config::Config;
use auction_lifecycle::database::DatabaseManager;
use auction_lifecycle::handlers;
use auction_lifecycle::mailer::{KafkaMailer, LogMailer, WinnerMailer};
use auction_lifecycle::message_broker::KafkaManager;
use auction_lifecycle::store::{
    AuctionStore, MemoryAuctionStore, MemoryNotificationStore, MemoryUserDirectory,
    NotificationStore, PgAuctionStore, PgNotificationStore, PgUserDirectory, UserDirectory,
};
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    // 저장소 선택
    let (auctions, notifications, users): (
        Arc<dyn AuctionStore>,
        Arc<dyn NotificationStore>,
        Arc<dyn UserDirectory>,
    ) = match &config.database_url {
        Some(url) => {
            let db_manager =
                Arc::new(DatabaseManager::new(url, config.database_max_connections).await?);
            if let Err(e) = db_manager.initialize_database().await {
                error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
                return Err(e.into());
            }
            info!("{:<12} --> 데이터베이스 초기화 성공", "Main");
            let auctions: Arc<dyn AuctionStore> =
                Arc::new(PgAuctionStore::new(Arc::clone(&db_manager)));
            let notifications: Arc<dyn NotificationStore> =
                Arc::new(PgNotificationStore::new(Arc::clone(&db_manager)));
            let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db_manager));
            (auctions, notifications, users)
        }
        None => {
            warn!(
                "{:<12} --> DATABASE_URL 미설정: 인메모리 저장소로 실행",
                "Main"
            );
            let outbox = MemoryNotificationStore::new();
            let auctions: Arc<dyn AuctionStore> =
                Arc::new(MemoryAuctionStore::new(outbox.clone()));
            let notifications: Arc<dyn NotificationStore> = Arc::new(outbox);
            let users: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::new());
            (auctions, notifications, users)
        }
    };

    // 낙찰 메일러 선택
    let mailer: Arc<dyn WinnerMailer> = match &config.kafka_brokers {
        Some(brokers) => {
            let kafka_manager = KafkaManager::new(brokers)?;
            if let Err(e) = kafka_manager
                .create_topic(&config.winner_mail_topic, 1, 1)
                .await
            {
                warn!("{:<12} --> 메일 토픽 생성 실패 (계속 진행): {:?}", "Main", e);
            }
            info!("{:<12} --> Kafka 메일러 초기화 성공", "Main");
            Arc::new(KafkaMailer::new(
                kafka_manager.get_producer(),
                config.winner_mail_topic.clone(),
            ))
        }
        None => {
            warn!("{:<12} --> KAFKA_BROKERS 미설정: 로그 메일러 사용", "Main");
            Arc::new(LogMailer)
        }
    };

    let state = AppState::assemble(
        Backends {
            auctions,
            notifications,
            users,
            mailer,
            clock: Arc::new(SystemClock),
        },
        &config,
    );

    // 상태 전이 스케줄러 시작
    let _scheduler = Arc::clone(&state.scheduler).start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = handlers::routes(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024));

    // 리스너 생성
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
