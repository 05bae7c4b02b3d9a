//! Player facade
//!
//! The externally observed player state. Backed by at most one active
//! [`MediaModel`] whose attributes are mirrored onto the facade and whose
//! non-change events are forwarded on [`PlayerModel::media_controller`].

use crate::attributes::{AttrKey, AttrValue, Attributes, Snapshot};
use crate::config::PlayerConfig;
use crate::emitter::{Emitter, ListenerId, Owner, Topic};
use crate::error::Result;
use crate::events::{ModelEvent, ModelEventKind};
use crate::media_model::MediaModel;
use crate::provider::{ProviderFactory, ProviderRegistry};
use crate::storage::SettingsStore;
use crate::types::{Environment, MediaContainer, PlayerState, PlaylistItem};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Attributes copied from the active media model
pub const MIRRORED_ATTRIBUTES: [AttrKey; 6] = [
    AttrKey::Duration,
    AttrKey::Position,
    AttrKey::Buffer,
    AttrKey::BufferFull,
    AttrKey::Provider,
    AttrKey::MediaType,
];

/// Registrations installed by one `mirror()`: one per mirrored attribute,
/// the event forwarder and the state normalizer
pub const MIRROR_LISTENER_COUNT: usize = MIRRORED_ATTRIBUTES.len() + 2;

const MAX_EVENT_ROUNDS: usize = 64;

/// Collapse transient engine states into the externally observed one
pub fn normalize_state(state: PlayerState) -> PlayerState {
    match state {
        PlayerState::Loading | PlayerState::Stalled => PlayerState::Buffering,
        other => other,
    }
}

/// What a mirror registration does with its deliveries
#[derive(Debug, Clone, PartialEq, Eq)]
enum MirrorRole {
    Attribute(AttrKey),
    Forward,
    State,
}

pub struct PlayerModel {
    owner: Owner,
    attrs: Attributes,
    environment: Environment,
    settings: Option<Box<dyn SettingsStore>>,

    factories: Vec<Rc<dyn ProviderFactory>>,
    providers: RefCell<Option<Rc<ProviderRegistry>>>,

    active: Option<MediaModel>,
    mirror: Vec<(ListenerId, MirrorRole)>,
    media_controller: Emitter<ModelEvent>,
}

impl std::fmt::Debug for PlayerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerModel")
            .field("attrs", &self.attrs)
            .field("environment", &self.environment)
            .field("factories", &self.factories.len())
            .field("active", &self.active)
            .field("mirror", &self.mirror.len())
            .finish_non_exhaustive()
    }
}

impl Default for PlayerModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerModel {
    pub fn new() -> Self {
        Self {
            owner: Owner::next(),
            attrs: Attributes::new(),
            environment: Environment::default(),
            settings: None,
            factories: Vec::new(),
            providers: RefCell::new(None),
            active: None,
            mirror: Vec::new(),
            media_controller: Emitter::new(),
        }
    }

    /// Runtime environment the player is embedded in
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Source of persisted settings merged during setup
    pub fn with_settings_store(mut self, store: Box<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Add a provider factory; the registry is rebuilt on next use
    pub fn register_provider(&mut self, factory: Rc<dyn ProviderFactory>) {
        debug!(provider = %factory.name(), "Registering provider");
        self.factories.push(factory);
        self.providers.borrow_mut().take();
    }

    /// Initialize the player
    ///
    /// Values are layered: configuration, then persisted settings (when
    /// `cookies` is enabled), then the fixed initial state.
    pub fn setup(&mut self, config: PlayerConfig) -> &mut Self {
        self.attrs.extend(config.to_attributes());

        if config.cookies {
            self.merge_persisted();
        }

        self.attrs.extend([
            (AttrKey::State, AttrValue::State(PlayerState::Idle)),
            (AttrKey::FlashBlocked, AttrValue::Bool(false)),
            (AttrKey::Fullscreen, AttrValue::Bool(false)),
            (AttrKey::CompactUi, AttrValue::Bool(false)),
            (AttrKey::Scrubbing, AttrValue::Bool(false)),
        ]);

        if !self.environment.allows_autostart() {
            self.attrs.set(AttrKey::Autostart, false);
        }

        self.update_providers();
        self
    }

    fn merge_persisted(&self) {
        let Some(store) = &self.settings else {
            return;
        };

        match store.load_all() {
            Ok(items) => {
                debug!("Merging {} persisted settings", items.len());
                for (name, value) in items {
                    self.attrs.set(AttrKey::from_name(&name), value);
                }
            }
            Err(e) => warn!("Failed to load persisted settings: {}", e),
        }
    }

    /// Current attributes, suitable for handing to providers
    pub fn get_configuration(&self) -> Snapshot {
        self.attrs.snapshot()
    }

    /// Provider registry, built on first use
    pub fn get_providers(&self) -> Rc<ProviderRegistry> {
        if let Some(registry) = self.providers.borrow().as_ref() {
            return Rc::clone(registry);
        }
        self.update_providers()
    }

    /// Rebuild the provider registry from the current configuration
    pub fn update_providers(&self) -> Rc<ProviderRegistry> {
        let registry = Rc::new(ProviderRegistry::new(
            &self.factories,
            &self.get_configuration(),
        ));
        *self.providers.borrow_mut() = Some(Rc::clone(&registry));
        registry
    }

    /// Build a media model for `item` without activating it
    pub fn create_media_controller(&self, item: PlaylistItem) -> Result<MediaModel> {
        let mut model = MediaModel::new(self.attrs.clone());
        model.setup(Vec::new());
        model.load_media_item(item, &self.get_providers())?;
        Ok(model)
    }

    /// Make `model` the mirrored model
    ///
    /// The previous model is destroyed and fully unmirrored first.
    pub fn set_active_media_controller(&mut self, model: MediaModel) {
        if let Some(mut previous) = self.active.take() {
            previous.destroy();
            previous.reset_provider();
            self.unmirror(&previous);
        }

        self.mirror(&model);
        self.active = Some(model);
    }

    fn mirror(&mut self, model: &MediaModel) {
        let events = model.events();

        for key in MIRRORED_ATTRIBUTES {
            self.attrs
                .set(key.clone(), model.get(&key).unwrap_or_default());
            let id = events.on(self.owner, Topic::Only(ModelEventKind::Change(key.clone())));
            self.mirror.push((id, MirrorRole::Attribute(key)));
        }

        if let Some(state) = model.attributes().get_state() {
            self.attrs.set(AttrKey::State, normalize_state(state));
        }

        let id = events.on(self.owner, Topic::All);
        self.mirror.push((id, MirrorRole::Forward));

        let id = events.on(self.owner, Topic::Only(ModelEventKind::Change(AttrKey::State)));
        self.mirror.push((id, MirrorRole::State));

        debug!(listeners = self.mirror.len(), "Mirroring media model");
    }

    fn unmirror(&mut self, model: &MediaModel) {
        let events = model.events();
        for (id, _) in self.mirror.drain(..) {
            events.off(id);
        }
        debug!("Unmirrored media model");
    }

    /// Registrations currently held for mirroring
    pub fn mirrored_listener_count(&self) -> usize {
        self.mirror.len()
    }

    /// The active media model
    pub fn get_video(&self) -> Option<&MediaModel> {
        self.active.as_ref()
    }

    pub fn get_video_mut(&mut self) -> Option<&mut MediaModel> {
        self.active.as_mut()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn get(&self, key: &AttrKey) -> Option<AttrValue> {
        self.attrs.get(key)
    }

    pub fn set(&self, key: AttrKey, value: impl Into<AttrValue>) -> bool {
        self.attrs.set(key, value)
    }

    pub fn state(&self) -> Option<PlayerState> {
        self.attrs.get_state()
    }

    /// Outward stream of events forwarded from the active model
    pub fn media_controller(&self) -> &Emitter<ModelEvent> {
        &self.media_controller
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        if !self.attrs.set(AttrKey::Fullscreen, fullscreen) {
            return;
        }

        if let Some(model) = self.active.as_mut() {
            if let Err(e) = model.set_fullscreen(fullscreen) {
                trace!("Fullscreen not applied to provider: {}", e);
            }
        }
        self.media_controller
            .emit(ModelEvent::Fullscreen { fullscreen });
    }

    /// Render target for providers; pending models bind when it arrives
    pub fn set_media_container(&self, container: MediaContainer) {
        self.attrs.set(AttrKey::MediaContainer, container);
    }

    /// Pump the active model and apply mirrored deliveries until nothing is pending
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;

        for _ in 0..MAX_EVENT_ROUNDS {
            let Some(model) = self.active.as_mut() else {
                return handled;
            };

            let mut round = model.process_events();
            let deliveries = model.events().drain(self.owner);
            round += deliveries.len();

            for (id, event) in deliveries {
                self.apply_mirrored(id, event);
            }

            if round == 0 {
                return handled;
            }
            handled += round;
        }

        warn!(handled, "Player event processing did not settle");
        handled
    }

    fn apply_mirrored(&mut self, id: ListenerId, event: ModelEvent) {
        let Some(role) = self
            .mirror
            .iter()
            .find(|(listener, _)| *listener == id)
            .map(|(_, role)| role.clone())
        else {
            return;
        };

        match (role, event) {
            (MirrorRole::Attribute(key), ModelEvent::Change { value, .. }) => {
                trace!(attribute = %key, "Mirroring attribute");
                self.attrs.set(key, value);
            }
            (MirrorRole::State, ModelEvent::Change { value, .. }) => {
                if let Some(state) = value.as_state() {
                    let state = normalize_state(state);
                    if self.attrs.set(AttrKey::State, state) {
                        debug!(state = %state, "Player state changed");
                    }
                }
            }
            (MirrorRole::Forward, event) if !event.is_change() => {
                trace!(event = ?event, "Forwarding model event");
                self.media_controller.emit(event);
            }
            _ => {}
        }
    }
}
