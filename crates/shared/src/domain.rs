use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);

/// Journal entry identifier; random v4, minted server-side on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The three decoder tools. Each runs the same catalog-and-session
/// workflow with its own dataset and vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Emotion,
    Allergy,
    Belief,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Emotion, Domain::Allergy, Domain::Belief];

    /// URL path segment, e.g. `/api/emotion-decoder/can-use`.
    pub fn slug(self) -> &'static str {
        match self {
            Domain::Emotion => "emotion-decoder",
            Domain::Allergy => "allergy-identifier",
            Domain::Belief => "belief-decoder",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Domain> {
        Domain::ALL.into_iter().find(|d| d.slug() == slug)
    }

    /// JSON key carrying the selected label in the use-endpoint body.
    pub fn item_field(self) -> &'static str {
        match self {
            Domain::Emotion => "emotion",
            Domain::Allergy => "allergen",
            Domain::Belief => "belief",
        }
    }

    pub fn dataset_file(self) -> String {
        format!("{}.csv", self.slug())
    }

    pub fn title(self) -> &'static str {
        match self {
            Domain::Emotion => "Emotion Decoder",
            Domain::Allergy => "Allergy Identifier",
            Domain::Belief => "Belief Decoder",
        }
    }
}

/// Journal mood vocabulary; anything else is rejected at the API edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Grateful,
    Peaceful,
    Reflective,
    Inspired,
    Curious,
    Challenged,
    Emotional,
    Joyful,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Grateful,
        Mood::Peaceful,
        Mood::Reflective,
        Mood::Inspired,
        Mood::Curious,
        Mood::Challenged,
        Mood::Emotional,
        Mood::Joyful,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Grateful => "grateful",
            Mood::Peaceful => "peaceful",
            Mood::Reflective => "reflective",
            Mood::Inspired => "inspired",
            Mood::Curious => "curious",
            Mood::Challenged => "challenged",
            Mood::Emotional => "emotional",
            Mood::Joyful => "joyful",
        }
    }

    pub fn from_str(value: &str) -> Option<Mood> {
        Mood::ALL.into_iter().find(|m| m.as_str() == value)
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Mood::Grateful => "🙏",
            Mood::Peaceful => "🕊️",
            Mood::Reflective => "🤔",
            Mood::Inspired => "✨",
            Mood::Curious => "🔍",
            Mood::Challenged => "💪",
            Mood::Emotional => "💗",
            Mood::Joyful => "😊",
        }
    }
}

/// Gate outcome derived fresh on every page entry; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessState {
    pub needs_auth: bool,
    pub needs_subscription: bool,
    pub can_use: bool,
    pub usage_count: i64,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    NeedsAuth,
    NeedsSubscription,
}

impl AccessState {
    pub fn unauthenticated() -> Self {
        Self {
            needs_auth: true,
            ..Self::default()
        }
    }

    /// Exactly one of the three outcomes holds for any state produced
    /// by the gate.
    pub fn decision(&self) -> AccessDecision {
        if self.needs_auth {
            AccessDecision::NeedsAuth
        } else if self.needs_subscription {
            AccessDecision::NeedsSubscription
        } else {
            AccessDecision::Allowed
        }
    }
}
