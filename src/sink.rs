//! Assignment sinks: where validated field values end up.

use serde::{Deserialize, Serialize};

use crate::error::AssignError;
use crate::field::{FieldKind, VersionType};

/// Receives the values a template extracted from an input.
///
/// Turning a sink into a domain object is the caller's business; the engine
/// only ever calls these setters through [`FieldKind::assign`].
pub trait TrackSink {
    fn set_title(&mut self, title: String);
    fn set_album_title(&mut self, title: String);
    fn add_main_artists(&mut self, artists: Vec<String>);
    fn add_features(&mut self, artists: Vec<String>);
    fn add_producers(&mut self, artists: Vec<String>);
    fn add_extra_artists(&mut self, artists: Vec<String>);
    fn add_genres(&mut self, genres: Vec<String>);
    fn set_version(&mut self, version: VersionType);
    fn set_version_token(&mut self, token: String);
    fn set_number(&mut self, number: u32);
    fn set_hidden_track(&mut self, title: String);
    fn add_ignored(&mut self, value: String);

    fn assign(&mut self, kind: FieldKind, values: &[String]) -> Result<(), AssignError> {
        kind.assign(values, self)
    }
}

// ============================================================================
// Default Sink
// ============================================================================

/// Plain record of everything a template extracted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTrack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub main_artists: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub producers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extra_artists: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_track: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ignored: Vec<String>,
}

/// Append names not already present (case-insensitive), keeping order.
fn extend_unique(into: &mut Vec<String>, names: Vec<String>) {
    for name in names {
        let key = name.to_lowercase();
        if !into.iter().any(|n| n.to_lowercase() == key) {
            into.push(name);
        }
    }
}

impl TrackSink for ParsedTrack {
    fn set_title(&mut self, title: String) {
        self.title = Some(title);
    }

    fn set_album_title(&mut self, title: String) {
        self.album_title = Some(title);
    }

    fn add_main_artists(&mut self, artists: Vec<String>) {
        extend_unique(&mut self.main_artists, artists);
    }

    fn add_features(&mut self, artists: Vec<String>) {
        extend_unique(&mut self.features, artists);
    }

    fn add_producers(&mut self, artists: Vec<String>) {
        extend_unique(&mut self.producers, artists);
    }

    fn add_extra_artists(&mut self, artists: Vec<String>) {
        extend_unique(&mut self.extra_artists, artists);
    }

    fn add_genres(&mut self, genres: Vec<String>) {
        extend_unique(&mut self.genres, genres);
    }

    fn set_version(&mut self, version: VersionType) {
        self.version = Some(version);
    }

    fn set_version_token(&mut self, token: String) {
        self.version_token = Some(token);
    }

    fn set_number(&mut self, number: u32) {
        self.number = Some(number);
    }

    fn set_hidden_track(&mut self, title: String) {
        self.hidden_track = Some(title);
    }

    fn add_ignored(&mut self, value: String) {
        self.ignored.push(value);
    }
}
