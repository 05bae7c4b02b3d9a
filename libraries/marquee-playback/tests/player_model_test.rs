//! Integration tests for the player facade
//!
//! These tests drive complete load/play/switch workflows through the public API.

mod common;

use common::setup_player;
use marquee_playback::test_utils::{item, ProviderCall};
use marquee_playback::{
    AttrKey, JsonFileStore, MediaContainer, MediaModel, ModelEvent, ModelEventKind, Owner,
    PlayerConfig, PlayerError, PlayerModel, PlayerState, PlaylistItem, ProviderEvent, Topic,
    MIRROR_LISTENER_COUNT,
};
use tempfile::TempDir;

fn forwarded(player: &PlayerModel, observer: Owner) -> Vec<ModelEvent> {
    player
        .media_controller()
        .drain(observer)
        .into_iter()
        .map(|(_, e)| e)
        .collect()
}

#[test]
fn test_item_without_sources_changes_nothing() {
    let (mut player, html5, hls) = setup_player(PlayerConfig::default());

    let model = player
        .create_media_controller(PlaylistItem::default())
        .expect("empty item loads");
    player.set_active_media_controller(model);
    player.process_events();

    assert!(html5.created().is_empty());
    assert!(hls.created().is_empty());
    assert!(player.get_video().unwrap().get_video().is_none());
    assert_eq!(player.state(), Some(PlayerState::Idle));
}

#[test]
fn test_matching_source_constructs_provider_and_announces() {
    let (player, html5, _) = setup_player(PlayerConfig::with_id("stage"));

    let mut model = MediaModel::new(player.attributes().clone());
    model.setup(Vec::new());
    let observer = Owner::next();
    model
        .events()
        .on(observer, Topic::Only(ModelEventKind::MediaItemSet));

    model
        .load_media_item(
            item("https://cdn.example.com/v/intro.mp4?sig=abc"),
            &player.get_providers(),
        )
        .unwrap();

    assert_eq!(html5.created().len(), 1);
    assert_eq!(model.events().drain(observer).len(), 1);
    assert_eq!(model.attributes().get_state(), Some(PlayerState::Idle));
}

#[test]
fn test_unsupported_source_is_a_load_error() {
    let (player, _, _) = setup_player(PlayerConfig::default());

    let err = player
        .create_media_controller(item("podcast.ogg"))
        .unwrap_err();

    assert!(matches!(err, PlayerError::NoSuitableProvider { .. }));
    assert!(err.to_string().contains("podcast.ogg"));
}

#[test]
fn test_full_playback_flow() {
    let (mut player, _, hls) = setup_player(PlayerConfig::with_id("stage"));
    let observer = Owner::next();
    player.media_controller().on(observer, Topic::All);

    let model = player
        .create_media_controller(item("live/master.m3u8"))
        .unwrap();
    player.set_active_media_controller(model);
    assert_eq!(player.mirrored_listener_count(), MIRROR_LISTENER_COUNT);

    player.get_video_mut().unwrap().load_video().unwrap();
    let engine = hls.last().unwrap();

    engine.emit(ProviderEvent::PlayerState {
        new_state: PlayerState::Loading,
    });
    engine.emit(ProviderEvent::BufferProgress {
        buffer_percent: 40.0,
        duration: Some(600.0),
    });
    engine.emit(ProviderEvent::BufferFull);
    player.process_events();

    assert_eq!(engine.play_count(), 1);
    assert_eq!(player.state(), Some(PlayerState::Buffering));
    assert_eq!(player.attributes().get_f64(&AttrKey::Buffer), Some(40.0));
    assert_eq!(player.attributes().get_f64(&AttrKey::Duration), Some(600.0));

    engine.emit(ProviderEvent::PlayerState {
        new_state: PlayerState::Playing,
    });
    engine.emit(ProviderEvent::MediaTime {
        position: 12.5,
        duration: 600.0,
    });
    engine.emit(ProviderEvent::Complete);
    player.process_events();

    assert_eq!(player.state(), Some(PlayerState::Playing));
    assert_eq!(player.attributes().get_f64(&AttrKey::Position), Some(12.5));

    let events = forwarded(&player, observer);
    assert!(events.contains(&ModelEvent::PlayAttempt));
    assert!(events.contains(&ModelEvent::Provider(ProviderEvent::Complete)));
    assert!(events.iter().all(|e| !e.is_change()));
    assert!(events
        .iter()
        .all(|e| !matches!(e, ModelEvent::Provider(ProviderEvent::PlayerState { .. }))));
}

#[test]
fn test_container_arrives_after_activation() {
    let (mut player, html5, _) = setup_player(PlayerConfig::default());
    let model = player.create_media_controller(item("a.mp4")).unwrap();
    player.set_active_media_controller(model);

    player.set_media_container(MediaContainer::new("player-div"));
    player.process_events();

    let engine = html5.last().unwrap();
    assert_eq!(
        engine.count(&ProviderCall::SetContainer(MediaContainer::new("player-div"))),
        1
    );
}

#[test]
fn test_container_known_before_load() {
    let (player, html5, _) = setup_player(PlayerConfig::default());
    player.set_media_container(MediaContainer::new("player-div"));

    let _model = player.create_media_controller(item("a.mp4")).unwrap();

    assert_eq!(
        html5
            .last()
            .unwrap()
            .count(&ProviderCall::SetContainer(MediaContainer::new("player-div"))),
        1
    );
}

#[test]
fn test_late_events_from_replaced_provider_are_ignored() {
    let (mut player, html5, hls) = setup_player(PlayerConfig::default());

    let first = player.create_media_controller(item("a.mp4")).unwrap();
    player.set_active_media_controller(first);
    let old_engine = html5.last().unwrap();

    let second = player
        .create_media_controller(item("b.m3u8"))
        .unwrap();
    old_engine.emit(ProviderEvent::MediaTime {
        position: 50.0,
        duration: 60.0,
    });
    player.set_active_media_controller(second);

    old_engine.emit(ProviderEvent::Error {
        message: "late".to_string(),
        code: None,
    });
    player.process_events();

    assert_eq!(old_engine.destroy_count(), 1);
    assert_eq!(player.attributes().get_f64(&AttrKey::Position), Some(0.0));
    assert_eq!(
        player.attributes().get_text(&AttrKey::Provider).as_deref(),
        Some("hls")
    );
    assert_eq!(hls.last().unwrap().destroy_count(), 0);
}

#[test]
fn test_persisted_settings_from_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("marquee.json");
    std::fs::write(&path, r#"{"volume": 35, "mute": true, "qualityLabel": "720p"}"#).unwrap();

    let mut config = PlayerConfig::with_id("stage");
    config.cookies = true;

    let mut player = PlayerModel::new().with_settings_store(Box::new(JsonFileStore::new(&path)));
    player.setup(config);

    let attrs = player.attributes();
    assert_eq!(attrs.get_f64(&AttrKey::Volume), Some(35.0));
    assert!(attrs.get_bool(&AttrKey::Mute));
    assert_eq!(
        attrs.get_text(&AttrKey::from_name("qualityLabel")).as_deref(),
        Some("720p")
    );
}

#[test]
fn test_unreadable_settings_do_not_block_setup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("marquee.json");
    std::fs::write(&path, "not json").unwrap();

    let mut config = PlayerConfig::default();
    config.cookies = true;

    let mut player = PlayerModel::new().with_settings_store(Box::new(JsonFileStore::new(&path)));
    player.setup(config);

    assert_eq!(player.attributes().get_f64(&AttrKey::Volume), Some(90.0));
    assert_eq!(player.state(), Some(PlayerState::Idle));
}

#[test]
fn test_configuration_snapshot_serializes() {
    let (player, _, _) = setup_player(PlayerConfig::with_id("stage"));
    let json = player.attributes().to_json();

    assert_eq!(json["id"], "stage");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["volume"], 90.0);
    assert!(player.get_configuration().contains_key(&AttrKey::Scrubbing));
}
