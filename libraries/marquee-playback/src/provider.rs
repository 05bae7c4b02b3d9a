//! Provider contract and provider registry
//!
//! A provider is a playback engine able to play one class of sources. The core
//! depends only on the [`Provider`] trait; concrete engines live elsewhere and
//! are made available through a [`ProviderFactory`].

use crate::attributes::{AttrKey, Snapshot};
use crate::emitter::Emitter;
use crate::events::ProviderEvent;
use crate::types::{MediaContainer, PlaylistItem, Source};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Playback engine contract
///
/// Requests such as `load` and `play` return immediately; completion is
/// reported later through [`Provider::events`].
pub trait Provider {
    /// Provider identifier ("html5", "hls", ...)
    fn name(&self) -> &str;

    /// Registry raw events are emitted on
    ///
    /// Supports wildcard and selective subscription and removal.
    fn events(&self) -> &Emitter<ProviderEvent>;

    /// Optional preload hook, called once after construction
    fn init(&mut self, _item: &PlaylistItem) {}

    fn load(&mut self, item: &PlaylistItem);

    fn play(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Seek to a position in seconds
    fn seek(&mut self, position: f64);

    /// Release every engine resource; the provider is unusable afterwards
    fn destroy(&mut self);

    /// Bind to the render target
    fn attach_media(&mut self);

    /// Unbind from the render target
    fn detach_media(&mut self);

    fn set_container(&mut self, container: &MediaContainer);

    /// Volume on a 0-100 scale
    fn set_volume(&mut self, volume: f64);

    fn set_mute(&mut self, mute: bool);

    fn set_current_quality(&mut self, index: i32);

    fn set_fullscreen(&mut self, fullscreen: bool);

    /// Optional subtitle switching; engines without support ignore it
    fn set_subtitles_track(&mut self, _index: i32) {}

    /// Whether the engine's own level reports are authoritative
    ///
    /// When true, media models do not overwrite `currentLevel` from level
    /// events.
    fn reports_own_quality(&self) -> bool {
        false
    }
}

/// Provider shared between its owning model and an ad-break session
pub type SharedProvider = Rc<RefCell<dyn Provider>>;

/// Wrap a provider for shared ownership
pub fn share<P: Provider + 'static>(provider: P) -> SharedProvider {
    Rc::new(RefCell::new(provider))
}

/// Check whether two handles refer to the same provider instance
pub fn same_provider(a: &SharedProvider, b: &SharedProvider) -> bool {
    Rc::ptr_eq(a, b)
}

/// Constructs providers for the sources it supports
pub trait ProviderFactory {
    /// Name of the providers this factory builds
    fn name(&self) -> &str;

    /// Capability match against a source descriptor
    fn supports(&self, source: &Source) -> bool;

    /// Construct a provider for `player_id` with the current player configuration
    fn create(&self, player_id: &str, config: &Snapshot) -> SharedProvider;
}

type BuildFn = dyn Fn(&str, &Snapshot) -> SharedProvider;

/// Factory matching sources by media type or mimetype
pub struct TypedProviderFactory {
    name: String,
    media_types: Vec<String>,
    build: Box<BuildFn>,
}

impl TypedProviderFactory {
    /// Create a factory for the given media types (extensions or mimetypes)
    pub fn new<F>(name: impl Into<String>, media_types: &[&str], build: F) -> Self
    where
        F: Fn(&str, &Snapshot) -> SharedProvider + 'static,
    {
        Self {
            name: name.into(),
            media_types: media_types.iter().map(|t| t.to_lowercase()).collect(),
            build: Box::new(build),
        }
    }
}

impl fmt::Debug for TypedProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedProviderFactory")
            .field("name", &self.name)
            .field("media_types", &self.media_types)
            .finish_non_exhaustive()
    }
}

impl ProviderFactory for TypedProviderFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, source: &Source) -> bool {
        source
            .media_type()
            .is_some_and(|kind| self.media_types.iter().any(|t| *t == kind))
    }

    fn create(&self, player_id: &str, config: &Snapshot) -> SharedProvider {
        (self.build)(player_id, config)
    }
}

/// Ordered set of provider factories used for source-to-provider selection
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Vec<Rc<dyn ProviderFactory>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ProviderRegistry {
    /// Build a registry from registered factories and the player configuration
    ///
    /// Factories keep their registration order, except that the one named by
    /// the `primary` attribute (if any) is tried first.
    pub fn new(factories: &[Rc<dyn ProviderFactory>], config: &Snapshot) -> Self {
        let mut factories = factories.to_vec();

        let primary = config
            .get(&AttrKey::Primary)
            .and_then(|v| v.as_str().map(str::to_string));
        if let Some(primary) = primary {
            if let Some(pos) = factories.iter().position(|f| f.name() == primary) {
                let preferred = factories.remove(pos);
                factories.insert(0, preferred);
            }
        }

        Self { factories }
    }

    /// First factory able to play `source`
    pub fn choose(&self, source: &Source) -> Option<Rc<dyn ProviderFactory>> {
        self.factories
            .iter()
            .find(|factory| factory.supports(source))
            .cloned()
    }

    /// Factory names in selection order
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
