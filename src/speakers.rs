//! Speaker catalog for the TTS stage
//!
//! Speaker ids are VCTK voices served by the backend TTS model. The catalog
//! is static; the selected id is passed with every synthesis request.

use std::fmt;

use crate::{Error, Result};

/// Speaker used when none is selected
pub const DEFAULT_SPEAKER: &str = "p225";

/// Width of a rendered trait meter
const METER_WIDTH: usize = 20;

/// Overall tone of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Calm,
    Cheerful,
    Energetic,
    Warm,
    Serious,
    Playful,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Calm => "calm",
            Self::Cheerful => "cheerful",
            Self::Energetic => "energetic",
            Self::Warm => "warm",
            Self::Serious => "serious",
            Self::Playful => "playful",
        };
        f.write_str(name)
    }
}

/// One personality meter shown next to a speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonalityTrait {
    pub emoji: &'static str,
    pub label: &'static str,
    /// 0-100
    pub value: u8,
}

/// A selectable TTS voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speaker {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub traits: &'static [PersonalityTrait],
    /// Accent color as `#rrggbb`
    pub color: &'static str,
    pub mood: Mood,
}

impl Speaker {
    /// Render the personality traits as text meters, one per line
    #[must_use]
    pub fn meters(&self) -> String {
        self.traits
            .iter()
            .map(|t| {
                let filled = usize::from(t.value.min(100)) * METER_WIDTH / 100;
                format!(
                    "{} {:<10} [{}{}] {:>3}",
                    t.emoji,
                    t.label,
                    "#".repeat(filled),
                    "-".repeat(METER_WIDTH - filled),
                    t.value
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

const fn meter(emoji: &'static str, label: &'static str, value: u8) -> PersonalityTrait {
    PersonalityTrait {
        emoji,
        label,
        value,
    }
}

static CATALOG: [Speaker; 10] = [
    Speaker {
        id: "p225",
        label: "Emma",
        description: "Clear, patient southern English voice. Good for beginners.",
        traits: &[meter("😊", "Kindness", 90), meter("🐢", "Pace", 35), meter("🎓", "Clarity", 95)],
        color: "#4A90E2",
        mood: Mood::Calm,
    },
    Speaker {
        id: "p226",
        label: "James",
        description: "Relaxed male voice with a steady rhythm.",
        traits: &[meter("😊", "Kindness", 70), meter("🐢", "Pace", 50), meter("🎓", "Clarity", 80)],
        color: "#50A060",
        mood: Mood::Warm,
    },
    Speaker {
        id: "p227",
        label: "Oliver",
        description: "Deliberate, formal delivery for focused practice.",
        traits: &[meter("😊", "Kindness", 55), meter("🐢", "Pace", 40), meter("🎓", "Clarity", 90)],
        color: "#5D6D7E",
        mood: Mood::Serious,
    },
    Speaker {
        id: "p228",
        label: "Sophie",
        description: "Bright and upbeat, keeps the conversation moving.",
        traits: &[meter("😊", "Kindness", 85), meter("🐢", "Pace", 70), meter("🎓", "Clarity", 75)],
        color: "#F5A623",
        mood: Mood::Cheerful,
    },
    Speaker {
        id: "p229",
        label: "Grace",
        description: "Soft-spoken and encouraging.",
        traits: &[meter("😊", "Kindness", 95), meter("🐢", "Pace", 30), meter("🎓", "Clarity", 80)],
        color: "#BD10E0",
        mood: Mood::Warm,
    },
    Speaker {
        id: "p230",
        label: "Chloe",
        description: "Quick and lively; a challenge for intermediate listeners.",
        traits: &[meter("😊", "Kindness", 75), meter("🐢", "Pace", 85), meter("🎓", "Clarity", 65)],
        color: "#E94E77",
        mood: Mood::Energetic,
    },
    Speaker {
        id: "p231",
        label: "Hannah",
        description: "Even-toned narrator voice.",
        traits: &[meter("😊", "Kindness", 65), meter("🐢", "Pace", 55), meter("🎓", "Clarity", 85)],
        color: "#7ED321",
        mood: Mood::Calm,
    },
    Speaker {
        id: "p232",
        label: "Liam",
        description: "Casual and humorous, good for small talk.",
        traits: &[meter("😊", "Kindness", 80), meter("🐢", "Pace", 65), meter("🎓", "Clarity", 70)],
        color: "#F8E71C",
        mood: Mood::Playful,
    },
    Speaker {
        id: "p233",
        label: "Mia",
        description: "Energetic northern English accent.",
        traits: &[meter("😊", "Kindness", 70), meter("🐢", "Pace", 80), meter("🎓", "Clarity", 60)],
        color: "#D0021B",
        mood: Mood::Energetic,
    },
    Speaker {
        id: "p234",
        label: "Ethan",
        description: "Low, measured voice suited to longer explanations.",
        traits: &[meter("😊", "Kindness", 60), meter("🐢", "Pace", 45), meter("🎓", "Clarity", 85)],
        color: "#417505",
        mood: Mood::Serious,
    },
];

/// All selectable speakers
#[must_use]
pub fn catalog() -> &'static [Speaker] {
    &CATALOG
}

/// Look up a speaker by id
#[must_use]
pub fn find(id: &str) -> Option<&'static Speaker> {
    CATALOG.iter().find(|s| s.id == id)
}

/// Look up a speaker, failing for unknown ids
///
/// # Errors
///
/// Returns [`Error::SpeakerNotFound`] if `id` is not in the catalog
pub fn resolve(id: &str) -> Result<&'static Speaker> {
    find(id).ok_or_else(|| Error::SpeakerNotFound(id.to_string()))
}
