/// 서비스 조립
/// 저장소/메일러/시계 구현체를 받아 각 컴포넌트를 명시적으로 주입한다.
// region:    --- Imports
use crate::auction::AuctionService;
use crate::bidding::BidLedger;
use crate::channel::ChannelRegistry;
use crate::clock::Clock;
use crate::config::Config;
use crate::mailer::WinnerMailer;
use crate::notification::NotificationService;
use crate::scheduler::TransitionScheduler;
use crate::store::{AuctionStore, NotificationStore, UserDirectory};
use std::sync::Arc;

// endregion: --- Imports

// region:    --- App State
/// 외부 협력자 구현체 묶음
pub struct Backends {
    pub auctions: Arc<dyn AuctionStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn WinnerMailer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub auctions: Arc<AuctionService>,
    pub ledger: Arc<BidLedger>,
    pub notifier: Arc<NotificationService>,
    pub channels: Arc<ChannelRegistry>,
    pub scheduler: Arc<TransitionScheduler>,
}

impl AppState {
    pub fn assemble(backends: Backends, config: &Config) -> Self {
        let channels = Arc::new(ChannelRegistry::new(config.channel_buffer));

        let notifier = Arc::new(NotificationService::new(
            Arc::clone(&backends.notifications),
            Arc::clone(&backends.users),
            Arc::clone(&channels),
            Arc::clone(&backends.clock),
        ));

        let scheduler = Arc::new(TransitionScheduler::new(
            Arc::clone(&backends.auctions),
            Arc::clone(&backends.users),
            Arc::clone(&notifier),
            Arc::clone(&channels),
            Arc::clone(&backends.mailer),
            Arc::clone(&backends.clock),
            config.scheduler,
        ));

        let ledger = Arc::new(
            BidLedger::new(
                Arc::clone(&backends.auctions),
                Arc::clone(&channels),
                Arc::clone(&notifier),
                Arc::clone(&backends.clock),
            )
            .with_max_retries(config.max_bid_retries),
        );

        let auctions = Arc::new(AuctionService::new(
            Arc::clone(&backends.auctions),
            Arc::clone(&notifier),
            Arc::clone(&channels),
            Arc::clone(&scheduler),
            Arc::clone(&backends.clock),
        ));

        Self {
            auctions,
            ledger,
            notifier,
            channels,
            scheduler,
        }
    }
}
// endregion: --- App State
