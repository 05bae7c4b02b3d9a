//! Attribute set shared by media models and the player facade
//!
//! Every mutation goes through [`Attributes::set`], which stores the value and,
//! only when it actually changed, emits a [`ModelEvent::Change`] scoped to that
//! attribute.

use crate::emitter::Emitter;
use crate::events::ModelEvent;
use crate::types::{AudioTrack, MediaContainer, PlayerState, PlaylistItem, QualityLevel, VisualQuality};
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrKey {
    Id,
    State,
    Duration,
    Position,
    Buffer,
    BufferFull,
    Active,
    Provider,
    MediaType,
    Levels,
    CurrentLevel,
    AudioTracks,
    CurrentAudioTrack,
    CaptionsIndex,
    FlashBlocked,
    PlayAttempt,
    VisualQuality,
    Volume,
    Mute,
    Fullscreen,
    CompactUi,
    Scrubbing,
    Autostart,
    MediaContainer,
    Item,
    PlaylistItem,
    InstreamMode,
    Primary,
    Cookies,
    /// Any configuration key without a dedicated variant
    Custom(String),
}

impl AttrKey {
    /// Wire name of the attribute
    pub fn as_str(&self) -> &str {
        match self {
            AttrKey::Id => "id",
            AttrKey::State => "state",
            AttrKey::Duration => "duration",
            AttrKey::Position => "position",
            AttrKey::Buffer => "buffer",
            AttrKey::BufferFull => "bufferFull",
            AttrKey::Active => "active",
            AttrKey::Provider => "provider",
            AttrKey::MediaType => "mediaType",
            AttrKey::Levels => "levels",
            AttrKey::CurrentLevel => "currentLevel",
            AttrKey::AudioTracks => "audioTracks",
            AttrKey::CurrentAudioTrack => "currentAudioTrack",
            AttrKey::CaptionsIndex => "captionsIndex",
            AttrKey::FlashBlocked => "flashBlocked",
            AttrKey::PlayAttempt => "playAttempt",
            AttrKey::VisualQuality => "visualQuality",
            AttrKey::Volume => "volume",
            AttrKey::Mute => "mute",
            AttrKey::Fullscreen => "fullscreen",
            AttrKey::CompactUi => "compactUI",
            AttrKey::Scrubbing => "scrubbing",
            AttrKey::Autostart => "autostart",
            AttrKey::MediaContainer => "mediaContainer",
            AttrKey::Item => "item",
            AttrKey::PlaylistItem => "playlistItem",
            AttrKey::InstreamMode => "instreamMode",
            AttrKey::Primary => "primary",
            AttrKey::Cookies => "cookies",
            AttrKey::Custom(name) => name,
        }
    }

    /// Parse a wire name; unknown names become [`AttrKey::Custom`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "id" => AttrKey::Id,
            "state" => AttrKey::State,
            "duration" => AttrKey::Duration,
            "position" => AttrKey::Position,
            "buffer" => AttrKey::Buffer,
            "bufferFull" => AttrKey::BufferFull,
            "active" => AttrKey::Active,
            "provider" => AttrKey::Provider,
            "mediaType" => AttrKey::MediaType,
            "levels" => AttrKey::Levels,
            "currentLevel" => AttrKey::CurrentLevel,
            "audioTracks" => AttrKey::AudioTracks,
            "currentAudioTrack" => AttrKey::CurrentAudioTrack,
            "captionsIndex" => AttrKey::CaptionsIndex,
            "flashBlocked" => AttrKey::FlashBlocked,
            "playAttempt" => AttrKey::PlayAttempt,
            "visualQuality" => AttrKey::VisualQuality,
            "volume" => AttrKey::Volume,
            "mute" => AttrKey::Mute,
            "fullscreen" => AttrKey::Fullscreen,
            "compactUI" => AttrKey::CompactUi,
            "scrubbing" => AttrKey::Scrubbing,
            "autostart" => AttrKey::Autostart,
            "mediaContainer" => AttrKey::MediaContainer,
            "item" => AttrKey::Item,
            "playlistItem" => AttrKey::PlaylistItem,
            "instreamMode" => AttrKey::InstreamMode,
            "primary" => AttrKey::Primary,
            "cookies" => AttrKey::Cookies,
            other => AttrKey::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AttrKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Attribute value
///
/// Untyped at this layer: which variant an attribute holds is a convention
/// (numbers for duration/position/buffer, `State` for state, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    State(PlayerState),
    Levels(Vec<QualityLevel>),
    AudioTracks(Vec<AudioTrack>),
    VisualQuality(VisualQuality),
    Item(Box<PlaylistItem>),
    Container(MediaContainer),
    Json(serde_json::Value),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<PlayerState> {
        match self {
            AttrValue::State(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&PlaylistItem> {
        match self {
            AttrValue::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&MediaContainer> {
        match self {
            AttrValue::Container(c) => Some(c),
            _ => None,
        }
    }

    /// Equality as seen by change detection: two NaN numbers are the same value
    pub fn same_as(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Number(a), AttrValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Loose truthiness, used where the attribute is a flag
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Null => false,
            AttrValue::Bool(b) => *b,
            AttrValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AttrValue::Text(s) => !s.is_empty(),
            AttrValue::Json(v) => !v.is_null() && v != &serde_json::Value::Bool(false),
            _ => true,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Number(f64::from(v))
    }
}

impl From<u8> for AttrValue {
    fn from(v: u8) -> Self {
        AttrValue::Number(f64::from(v))
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<PlayerState> for AttrValue {
    fn from(v: PlayerState) -> Self {
        AttrValue::State(v)
    }
}

impl From<PlaylistItem> for AttrValue {
    fn from(v: PlaylistItem) -> Self {
        AttrValue::Item(Box::new(v))
    }
}

impl From<MediaContainer> for AttrValue {
    fn from(v: MediaContainer) -> Self {
        AttrValue::Container(v)
    }
}

impl From<serde_json::Value> for AttrValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map_or(AttrValue::Json(serde_json::Value::Number(n)), AttrValue::Number),
            serde_json::Value::String(s) => AttrValue::Text(s),
            other => AttrValue::Json(other),
        }
    }
}

/// Point-in-time copy of an attribute set
pub type Snapshot = BTreeMap<AttrKey, AttrValue>;

/// Shared attribute set
///
/// Clones are handles onto the same values and the same event registry.
#[derive(Clone, Default)]
pub struct Attributes {
    values: Rc<RefCell<Snapshot>>,
    events: Emitter<ModelEvent>,
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("values", &self.values.borrow())
            .field("events", &self.events)
            .finish()
    }
}

impl Attributes {
    /// Create an empty attribute set with its own event registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute
    ///
    /// Returns true and emits a change notification only if the value changed.
    /// An absent attribute compares equal to [`AttrValue::Null`].
    pub fn set(&self, key: AttrKey, value: impl Into<AttrValue>) -> bool {
        let value = value.into();
        let previous = {
            let mut values = self.values.borrow_mut();
            if values.get(&key).unwrap_or(&AttrValue::Null).same_as(&value) {
                return false;
            }
            values.insert(key.clone(), value.clone()).unwrap_or_default()
        };

        self.events.emit(ModelEvent::Change {
            key,
            value,
            previous,
        });
        true
    }

    /// Set several attributes in order
    pub fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (AttrKey, AttrValue)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Current value, if set
    pub fn get(&self, key: &AttrKey) -> Option<AttrValue> {
        self.values.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &AttrKey) -> bool {
        self.values.borrow().contains_key(key)
    }

    /// Flag attribute (absent = false)
    pub fn get_bool(&self, key: &AttrKey) -> bool {
        self.values
            .borrow()
            .get(key)
            .is_some_and(AttrValue::is_truthy)
    }

    pub fn get_f64(&self, key: &AttrKey) -> Option<f64> {
        self.values.borrow().get(key).and_then(AttrValue::as_f64)
    }

    pub fn get_text(&self, key: &AttrKey) -> Option<String> {
        self.values
            .borrow()
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn get_state(&self) -> Option<PlayerState> {
        self.values
            .borrow()
            .get(&AttrKey::State)
            .and_then(AttrValue::as_state)
    }

    /// Copy of every attribute
    pub fn snapshot(&self) -> Snapshot {
        self.values.borrow().clone()
    }

    /// JSON view of every attribute, keyed by wire name
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.values.borrow()).unwrap_or(serde_json::Value::Null)
    }

    /// Registry for change notifications and other model events
    pub fn events(&self) -> &Emitter<ModelEvent> {
        &self.events
    }

    /// Emit a non-change event on this set's registry
    pub fn emit(&self, event: ModelEvent) {
        self.events.emit(event);
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }

    /// Check whether two handles point at the same set
    pub fn same_set(&self, other: &Attributes) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{Owner, Topic};
    use crate::events::ModelEventKind;

    #[test]
    fn set_notifies_only_on_change() {
        let attrs = Attributes::new();
        let owner = Owner::next();
        attrs
            .events()
            .on(owner, Topic::Only(ModelEventKind::Change(AttrKey::Position)));

        assert!(attrs.set(AttrKey::Position, 1.5));
        assert!(!attrs.set(AttrKey::Position, 1.5));
        assert!(attrs.set(AttrKey::Position, 2.0));

        let changes = attrs.events().drain(owner);
        assert_eq!(changes.len(), 2);
        match &changes[1].1 {
            ModelEvent::Change {
                key,
                value,
                previous,
            } => {
                assert_eq!(key, &AttrKey::Position);
                assert_eq!(value, &AttrValue::Number(2.0));
                assert_eq!(previous, &AttrValue::Number(1.5));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn repeated_nan_is_not_a_change() {
        let attrs = Attributes::new();
        let owner = Owner::next();
        attrs
            .events()
            .on(owner, Topic::Only(ModelEventKind::Change(AttrKey::Duration)));

        assert!(attrs.set(AttrKey::Duration, f64::NAN));
        assert!(!attrs.set(AttrKey::Duration, f64::NAN));
        assert!(attrs.set(AttrKey::Duration, 30.0));

        assert_eq!(attrs.events().drain(owner).len(), 2);
    }

    #[test]
    fn absent_equals_null() {
        let attrs = Attributes::new();
        assert!(!attrs.set(AttrKey::Levels, AttrValue::Null));
        assert!(!attrs.contains(&AttrKey::Levels));
    }

    #[test]
    fn wire_names_round_trip() {
        for key in [
            AttrKey::BufferFull,
            AttrKey::CompactUi,
            AttrKey::CurrentAudioTrack,
            AttrKey::MediaContainer,
        ] {
            assert_eq!(AttrKey::from_name(key.as_str()), key);
        }
        assert_eq!(
            AttrKey::from_name("skin"),
            AttrKey::Custom("skin".to_string())
        );
    }

    #[test]
    fn json_values_convert() {
        assert_eq!(AttrValue::from(serde_json::json!(0.5)), AttrValue::Number(0.5));
        assert_eq!(AttrValue::from(serde_json::json!("x")), AttrValue::Text("x".into()));
        assert_eq!(AttrValue::from(serde_json::json!(null)), AttrValue::Null);
        assert!(matches!(
            AttrValue::from(serde_json::json!({"a": 1})),
            AttrValue::Json(_)
        ));
    }

    #[test]
    fn snapshot_serializes_with_wire_names() {
        let attrs = Attributes::new();
        attrs.set(AttrKey::State, PlayerState::Idle);
        attrs.set(AttrKey::CompactUi, false);

        let json = attrs.to_json();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["compactUI"], false);
    }

    #[test]
    fn clones_share_values() {
        let attrs = Attributes::new();
        let handle = attrs.clone();
        handle.set(AttrKey::Volume, 40u8);

        assert_eq!(attrs.get_f64(&AttrKey::Volume), Some(40.0));
        assert!(attrs.same_set(&handle));
    }
}
