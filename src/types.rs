use serde::{Deserialize, Deserializer};

/// One observed "now playing" state of a station.
///
/// Equality only looks at what identifies the current item (title, artist,
/// album, streamer), so playback progress never reads as a change.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub station: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub art_url: Option<String>,
    pub streamer: String,
    pub live: bool,
    pub elapsed_secs: u64,
    pub duration_secs: u64,
    /// Unix timestamp (seconds) at which the current track started.
    pub played_at: Option<i64>,
}

impl Snapshot {
    /// Nothing is playing: no title, artist or album.
    pub fn is_idle(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty() && self.album.is_empty()
    }

    /// Build a snapshot for `station` from a decoded `np` object.
    pub fn from_payload(station: &str, np: NowPlayingPayload, rules: &TagRules) -> Self {
        let live = np.live.is_live;
        let streamer = if live && !np.live.streamer_name.is_empty() {
            np.live.streamer_name
        } else {
            rules.default_streamer.clone()
        };

        let current = np.now_playing.unwrap_or_default();
        let mut title = current.song.title;
        let mut artist = current.song.artist;
        let mut album = current.song.album;

        // Some live streamers send their tags with title and artist swapped
        if live && rules.swaps_tags(&streamer) {
            std::mem::swap(&mut title, &mut artist);
        }

        // "Track - Album" in the title field with no album tag
        if album.is_empty() {
            if let Some((track, from)) = title.split_once(" - ") {
                let (track, from) = (track.trim().to_string(), from.trim().to_string());
                title = track;
                album = from;
            }
        }

        let art_url = Some(current.song.art).filter(|url| !url.is_empty());

        Self {
            station: station.to_string(),
            title,
            artist,
            album,
            art_url,
            streamer,
            live,
            elapsed_secs: current.elapsed,
            duration_secs: current.duration,
            played_at: current.played_at,
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        if self.is_idle() && other.is_idle() {
            return true;
        }
        self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.streamer == other.streamer
    }
}

impl Eq for Snapshot {}

/// Station-specific tag cleanup applied while building snapshots.
#[derive(Debug, Clone)]
pub struct TagRules {
    /// Streamer name used when nobody is broadcasting live.
    pub default_streamer: String,
    /// Live streamers whose software swaps the title and artist tags.
    pub swapped_tag_streamers: Vec<String>,
}

impl TagRules {
    fn swaps_tags(&self, streamer: &str) -> bool {
        self.swapped_tag_streamers.iter().any(|s| s == streamer)
    }
}

impl Default for TagRules {
    fn default() -> Self {
        Self {
            default_streamer: "AutoDJ".to_string(),
            swapped_tag_streamers: Vec::new(),
        }
    }
}

/// The `np` object carried by every station publication.
#[derive(Debug, Default, Deserialize)]
pub struct NowPlayingPayload {
    #[serde(default)]
    pub live: LiveInfo,
    #[serde(default)]
    pub now_playing: Option<CurrentTrack>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveInfo {
    #[serde(default)]
    pub is_live: bool,
    #[serde(default, deserialize_with = "nullable_string")]
    pub streamer_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentTrack {
    #[serde(default)]
    pub elapsed: u64,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub played_at: Option<i64>,
    #[serde(default)]
    pub song: Song,
}

#[derive(Debug, Default, Deserialize)]
pub struct Song {
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub artist: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub album: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub art: String,
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
