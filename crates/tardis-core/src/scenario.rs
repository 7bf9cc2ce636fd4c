//! Scenario files.
//!
//! Two on-disk formats are accepted:
//!
//! - `.json5`: a [`ScenarioFile`] with events, room metadata, optional
//!   precalculated state, and annotations.
//! - anything else: newline-delimited JSON, one event per non-blank line.
//!
//! Both are validated into a [`Scenario`], whose `events` are in the order
//! they should be processed (normally a topological sort of the DAG).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tardis_types::{EventId, MatrixEvent, RoomId};
use tracing::info;

/// Room version used when a scenario does not name one.
pub const DEFAULT_ROOM_VERSION: &str = "10";

/// The only scenario file version understood.
pub const TARDIS_VERSION: u32 = 1;

/// Errors raised while reading or validating a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("failed to read scenario {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The `.json5` document could not be parsed.
    #[error("invalid scenario file: {0}")]
    Json5(#[from] json5::Error),

    /// A line of an NDJSON file is not a valid event.
    #[error("invalid event on line {line}: {source}")]
    Ndjson {
        /// 1-based line number.
        line: usize,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The scenario file declares a version this build does not know.
    #[error("unsupported tardis_version {0}, expected {TARDIS_VERSION}")]
    UnsupportedVersion(u32),

    /// The scenario asks for event IDs to be derived from event content,
    /// which needs the room version's reference hash algorithm.
    #[error("calculate_event_ids is not supported; give every event an explicit event_id")]
    CalculateEventIdsUnsupported,

    /// The scenario holds no events.
    #[error("scenario contains no events")]
    NoEvents,

    /// An event failed validation.
    #[error("event #{index} is invalid: {reason}")]
    InvalidEvent {
        /// 0-based position in the event list.
        index: usize,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Display strings attached to a scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Annotations {
    /// Graph title shown when no per-event title applies.
    #[serde(default)]
    pub title: Option<String>,
    /// Graph title to show while the cursor is on a given event.
    #[serde(default)]
    pub titles: BTreeMap<EventId, String>,
    /// Labels attached to individual events.
    #[serde(default)]
    pub events: BTreeMap<EventId, String>,
}

/// The `.json5` scenario file format.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    /// File format version; must be [`TARDIS_VERSION`].
    pub tardis_version: u32,
    /// Events in processing order.
    pub events: Vec<MatrixEvent>,
    /// Room version the events are represented in.
    #[serde(default)]
    pub room_version: Option<String>,
    /// Room ID given to events that lack one.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Derive event IDs from content. Not supported.
    #[serde(default)]
    pub calculate_event_ids: bool,
    /// Forced state after an event, as a list of state event IDs.
    #[serde(default)]
    pub precalculated_state_after: BTreeMap<EventId, Vec<EventId>>,
    /// Display strings.
    #[serde(default)]
    pub annotations: Option<Annotations>,
    /// Start with the cursor on the second event rather than the last.
    #[serde(default)]
    pub on_load_at_start: bool,
}

/// A validated scenario, ready to be loaded into a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Events in processing order. Every event has an ID, a type, a depth,
    /// and a room ID.
    pub events: Vec<MatrixEvent>,
    /// Room version passed to the resolver.
    pub room_version: String,
    /// Room the events belong to.
    pub room_id: RoomId,
    /// Forced state after an event, as a list of state event IDs.
    pub precalculated_state_after: BTreeMap<EventId, Vec<EventId>>,
    /// Display strings.
    pub annotations: Annotations,
    /// Start with the cursor on the second event rather than the last.
    pub on_load_at_start: bool,
}

impl Scenario {
    /// Read and validate a scenario file. The format is chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json5 = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json5"));

        let scenario = if is_json5 {
            Self::from_json5_str(&text)?
        } else {
            Self::from_ndjson_str(&text)?
        };
        info!(
            path = %path.display(),
            events = scenario.events.len(),
            room_id = %scenario.room_id,
            room_version = %scenario.room_version,
            "scenario loaded"
        );
        Ok(scenario)
    }

    /// Parse and validate a `.json5` scenario document.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] on parse or validation failure.
    pub fn from_json5_str(text: &str) -> Result<Self, ScenarioError> {
        let file: ScenarioFile = json5::from_str(text)?;
        Self::try_from(file)
    }

    /// Parse and validate newline-delimited JSON events.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] on parse or validation failure.
    pub fn from_ndjson_str(text: &str) -> Result<Self, ScenarioError> {
        let mut events = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: MatrixEvent = serde_json::from_str(line).map_err(|source| ScenarioError::Ndjson {
                line: i.saturating_add(1),
                source,
            })?;
            events.push(event);
        }
        let room_id = events.first().map(|e| e.room_id.clone());
        Self::try_from(ScenarioFile {
            tardis_version: TARDIS_VERSION,
            events,
            room_version: None,
            room_id,
            calculate_event_ids: false,
            precalculated_state_after: BTreeMap::new(),
            annotations: None,
            on_load_at_start: false,
        })
    }

    /// The event IDs in processing order.
    pub fn ordering(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.event_id.clone()).collect()
    }
}

impl TryFrom<ScenarioFile> for Scenario {
    type Error = ScenarioError;

    fn try_from(file: ScenarioFile) -> Result<Self, Self::Error> {
        if file.tardis_version != TARDIS_VERSION {
            return Err(ScenarioError::UnsupportedVersion(file.tardis_version));
        }
        if file.calculate_event_ids {
            return Err(ScenarioError::CalculateEventIdsUnsupported);
        }
        if file.events.is_empty() {
            return Err(ScenarioError::NoEvents);
        }

        let default_room = file.room_id.filter(|r| !r.is_empty());
        let mut events = file.events;
        for (index, event) in events.iter_mut().enumerate() {
            if let Some(room_id) = default_room.as_ref().filter(|_| event.room_id.is_empty()) {
                event.room_id = room_id.clone();
            }
            validate_event(index, event)?;
        }

        let room_id = default_room
            .or_else(|| events.first().map(|e| e.room_id.clone()))
            .unwrap_or_default();

        Ok(Self {
            events,
            room_version: file
                .room_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ROOM_VERSION.to_owned()),
            room_id,
            precalculated_state_after: file.precalculated_state_after,
            annotations: file.annotations.unwrap_or_default(),
            on_load_at_start: file.on_load_at_start,
        })
    }
}

fn validate_event(index: usize, event: &MatrixEvent) -> Result<(), ScenarioError> {
    let reason = if event.event_id.is_empty() {
        "missing 'event_id'"
    } else if event.event_type.is_empty() {
        "missing 'type'"
    } else if event.depth.is_none_or(|d| d == 0) {
        "missing 'depth'"
    } else if event.room_id.is_empty() {
        "missing 'room_id' and the scenario gives no default"
    } else {
        return Ok(());
    };
    Err(ScenarioError::InvalidEvent { index, reason })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        // A fork and a merge.
        tardis_version: 1,
        room_id: "!fork:tardis",
        on_load_at_start: true,
        events: [
            { event_id: "$CREATE", type: "m.room.create", state_key: "", sender: "@c:tardis",
              depth: 1, prev_events: [], auth_events: [], content: { creator: "@c:tardis" } },
            { event_id: "$JOIN", type: "m.room.member", state_key: "@c:tardis", sender: "@c:tardis",
              depth: 2, prev_events: ["$CREATE"], auth_events: ["$CREATE"], content: { membership: "join" } },
            { event_id: "$MSG", type: "m.room.message", sender: "@c:tardis", room_id: "!other:tardis",
              depth: 3, prev_events: ["$JOIN"], auth_events: ["$CREATE", "$JOIN"], content: { body: "hi" } },
        ],
        precalculated_state_after: { $MSG: ["$CREATE", "$JOIN"] },
        annotations: {
            title: "Fork",
            titles: { $JOIN: "Joined" },
            events: { $MSG: "a message" },
        },
    }"#;

    #[test]
    fn parses_json5_scenario() {
        let scenario = Scenario::from_json5_str(SCENARIO).unwrap();
        assert_eq!(scenario.events.len(), 3);
        assert_eq!(scenario.room_version, DEFAULT_ROOM_VERSION);
        assert_eq!(scenario.room_id, RoomId::from("!fork:tardis"));
        assert!(scenario.on_load_at_start);
        assert_eq!(
            scenario.ordering(),
            vec![EventId::from("$CREATE"), EventId::from("$JOIN"), EventId::from("$MSG")]
        );
        assert_eq!(scenario.annotations.title.as_deref(), Some("Fork"));
        assert_eq!(
            scenario.precalculated_state_after.get(&EventId::from("$MSG")).map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn room_id_fills_only_missing_fields() {
        let scenario = Scenario::from_json5_str(SCENARIO).unwrap();
        let rooms: Vec<&str> = scenario.events.iter().map(|e| e.room_id.as_str()).collect();
        assert_eq!(rooms, vec!["!fork:tardis", "!fork:tardis", "!other:tardis"]);
    }

    #[test]
    fn parses_ndjson_skipping_blank_lines() {
        let text = concat!(
            r#"{"event_id":"$A","type":"m.room.create","state_key":"","depth":1,"room_id":"!r:x"}"#,
            "\n\n   \n",
            r#"{"event_id":"$B","type":"m.room.message","depth":2,"prev_events":["$A"]}"#,
            "\n",
        );
        let scenario = Scenario::from_ndjson_str(text).unwrap();
        assert_eq!(scenario.events.len(), 2);
        assert_eq!(scenario.room_version, "10");
        assert_eq!(scenario.room_id, RoomId::from("!r:x"));
        assert_eq!(scenario.events.get(1).unwrap().room_id, RoomId::from("!r:x"));
        assert!(!scenario.on_load_at_start);
    }

    #[test]
    fn ndjson_reports_line_number() {
        let text = "{\"event_id\":\"$A\",\"type\":\"t\",\"depth\":1,\"room_id\":\"!r\"}\nnot json\n";
        let err = Scenario::from_ndjson_str(text).unwrap_err();
        assert!(matches!(err, ScenarioError::Ndjson { line: 2, .. }));
    }

    #[test]
    fn rejects_missing_fields() {
        let cases = [
            (r#"{"type":"t","depth":1,"room_id":"!r"}"#, "missing 'event_id'"),
            (r#"{"event_id":"$A","depth":1,"room_id":"!r"}"#, "missing 'type'"),
            (r#"{"event_id":"$A","type":"t","room_id":"!r"}"#, "missing 'depth'"),
            (r#"{"event_id":"$A","type":"t","depth":1}"#, "missing 'room_id' and the scenario gives no default"),
        ];
        for (line, expected) in cases {
            let err = Scenario::from_ndjson_str(line).unwrap_err();
            match err {
                ScenarioError::InvalidEvent { index, reason } => {
                    assert_eq!(index, 0);
                    assert_eq!(reason, expected);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let err = Scenario::from_json5_str("{ tardis_version: 2, events: [] }").unwrap_err();
        assert!(matches!(err, ScenarioError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_calculated_event_ids() {
        let text = r#"{ tardis_version: 1, calculate_event_ids: true, room_id: "!r",
            events: [{ event_id: "$A", type: "m.room.create", state_key: "", depth: 1 }] }"#;
        let err = Scenario::from_json5_str(text).unwrap_err();
        assert!(matches!(err, ScenarioError::CalculateEventIdsUnsupported));
    }

    #[test]
    fn rejects_empty_scenario() {
        assert!(matches!(
            Scenario::from_ndjson_str("\n\n").unwrap_err(),
            ScenarioError::NoEvents
        ));
    }

    #[test]
    fn explicit_room_version_is_kept() {
        let text = r#"{ tardis_version: 1, room_version: "11", room_id: "!r",
            events: [{ event_id: "$A", type: "m.room.create", state_key: "", depth: 1 }] }"#;
        let scenario = Scenario::from_json5_str(text).unwrap();
        assert_eq!(scenario.room_version, "11");
    }

    #[test]
    fn from_path_picks_format_by_extension() {
        let dir = std::env::temp_dir().join(format!("tardis-scenario-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let json5_path = dir.join("fork.json5");
        std::fs::write(&json5_path, SCENARIO).unwrap();
        assert_eq!(Scenario::from_path(&json5_path).unwrap().events.len(), 3);

        let ndjson_path = dir.join("events.ndjson");
        std::fs::write(
            &ndjson_path,
            r#"{"event_id":"$A","type":"m.room.create","state_key":"","depth":1,"room_id":"!r"}"#,
        )
        .unwrap();
        assert_eq!(Scenario::from_path(&ndjson_path).unwrap().events.len(), 1);

        let missing = Scenario::from_path(dir.join("nope.json5")).unwrap_err();
        assert!(matches!(missing, ScenarioError::Io { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
