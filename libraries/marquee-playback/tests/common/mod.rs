//! Shared fixtures for integration tests

use marquee_playback::test_utils::RecordingFactory;
use marquee_playback::{PlayerConfig, PlayerModel, ProviderFactory};
use std::rc::Rc;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging once per test binary
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Player with an "html5" (mp4/webm) and an "hls" (m3u8) provider registered
pub fn setup_player(config: PlayerConfig) -> (PlayerModel, Rc<RecordingFactory>, Rc<RecordingFactory>) {
    init_tracing();

    let html5 = Rc::new(RecordingFactory::new("html5", &["mp4", "webm"]));
    let hls = Rc::new(RecordingFactory::new("hls", &["m3u8"]));

    let mut player = PlayerModel::new();
    player.register_provider(Rc::clone(&html5) as Rc<dyn ProviderFactory>);
    player.register_provider(Rc::clone(&hls) as Rc<dyn ProviderFactory>);
    player.setup(config);

    (player, html5, hls)
}
