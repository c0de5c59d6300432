//! Fez type tags.

use serde::Serialize;

/// The kind of a fez.
///
/// Token strings are part of the API (they appear in request bodies and are
/// returned by `GET /api/fez/types`), so they are kept separate from the
/// display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FezType {
    /// A private chat. Participants are fixed at creation; no location, time or capacity.
    Closed,
    Activity,
    Dining,
    Gaming,
    Meetup,
    Music,
    Other,
    /// A shore excursion.
    Shore,
}

impl FezType {
    /// All types in declaration order.
    pub const ALL: [FezType; 8] = [
        FezType::Closed,
        FezType::Activity,
        FezType::Dining,
        FezType::Gaming,
        FezType::Meetup,
        FezType::Music,
        FezType::Other,
        FezType::Shore,
    ];

    /// Lower-case machine token.
    pub fn as_str(&self) -> &'static str {
        match self {
            FezType::Closed => "closed",
            FezType::Activity => "activity",
            FezType::Dining => "dining",
            FezType::Gaming => "gaming",
            FezType::Meetup => "meetup",
            FezType::Music => "music",
            FezType::Other => "other",
            FezType::Shore => "shore",
        }
    }

    /// Consumer-facing name.
    pub fn label(&self) -> &'static str {
        match self {
            FezType::Closed => "Private",
            FezType::Activity => "Activity",
            FezType::Dining => "Dining",
            FezType::Gaming => "Gaming",
            FezType::Meetup => "Meetup",
            FezType::Music => "Music",
            FezType::Other => "Other",
            FezType::Shore => "Shore",
        }
    }

    /// Resolve an API token, case-insensitively. `"private"` is accepted as an alias of `closed`.
    pub fn from_api_str(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "private" {
            return Some(FezType::Closed);
        }
        FezType::ALL.into_iter().find(|t| t.as_str() == lower)
    }
}
