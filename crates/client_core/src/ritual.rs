use catalog::CatalogItem;
use shared::domain::Domain;

/// Bound into the remaining steps when the seeker leaves the
/// replacement choice blank.
pub const DEFAULT_REPLACEMENT_WORD: &str = "Love";

/// High-vibration words offered as presets at the replacement step.
pub const PRESET_REPLACEMENT_WORDS: [&str; 18] = [
    "Love",
    "Peace",
    "Joy",
    "Gratitude",
    "Courage",
    "Compassion",
    "Trust",
    "Acceptance",
    "Abundance",
    "Clarity",
    "Freedom",
    "Wholeness",
    "Serenity",
    "Wisdom",
    "Harmony",
    "Balance",
    "Empowerment",
    "Healing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RitualStep {
    Intention,
    Release,
    Replace,
    ColorWork,
    Seal,
}

impl RitualStep {
    pub fn number(self) -> u8 {
        match self {
            RitualStep::Intention => 1,
            RitualStep::Release => 2,
            RitualStep::Replace => 3,
            RitualStep::ColorWork => 4,
            RitualStep::Seal => 5,
        }
    }

    fn next(self) -> Option<RitualStep> {
        match self {
            RitualStep::Intention => Some(RitualStep::Release),
            RitualStep::Release => Some(RitualStep::Replace),
            RitualStep::Replace => Some(RitualStep::ColorWork),
            RitualStep::ColorWork => Some(RitualStep::Seal),
            RitualStep::Seal => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RitualStep::Intention => "Set Your Intention",
            RitualStep::Release => "Release",
            RitualStep::Replace => "Replace with High Vibration",
            RitualStep::ColorWork => "Color Healing",
            RitualStep::Seal => "Seal the Work",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RitualPhase {
    Step(RitualStep),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPrompt {
    pub step: RitualStep,
    pub title: String,
    pub body: String,
}

/// One guided healing session for a selected catalog item.
///
/// Strictly linear: five steps, forward transitions only, `Complete`
/// terminal. The replacement word typed or picked at step 3 is bound
/// into the prompts of steps 4 and 5.
#[derive(Debug, Clone)]
pub struct RitualSession {
    domain: Domain,
    item: CatalogItem,
    phase: RitualPhase,
    replacement_input: String,
    replacement: Option<String>,
}

impl RitualSession {
    pub fn new(domain: Domain, item: CatalogItem) -> Self {
        Self {
            domain,
            item,
            phase: RitualPhase::Step(RitualStep::Intention),
            replacement_input: String::new(),
            replacement: None,
        }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn item(&self) -> &CatalogItem {
        &self.item
    }

    pub fn phase(&self) -> RitualPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == RitualPhase::Complete
    }

    /// Word bound at the 3→4 transition; `None` before that.
    pub fn replacement_word(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    /// Fills the replacement input; a preset click and free typing both
    /// land here. Only meaningful before leaving step 3.
    pub fn set_replacement_input(&mut self, word: impl Into<String>) {
        self.replacement_input = word.into();
    }

    /// The explicit continue action. Leaving the replacement step binds
    /// the chosen word, defaulting when the input is blank.
    pub fn advance(&mut self) -> RitualPhase {
        let RitualPhase::Step(step) = self.phase else {
            return RitualPhase::Complete;
        };

        if step == RitualStep::Replace {
            let chosen = self.replacement_input.trim();
            self.replacement = Some(if chosen.is_empty() {
                DEFAULT_REPLACEMENT_WORD.to_string()
            } else {
                chosen.to_string()
            });
        }

        self.phase = match step.next() {
            Some(next) => RitualPhase::Step(next),
            None => RitualPhase::Complete,
        };
        self.phase
    }

    /// Display text for the current step; `None` once complete.
    pub fn prompt(&self) -> Option<StepPrompt> {
        let RitualPhase::Step(step) = self.phase else {
            return None;
        };

        let label = &self.item.label;
        let location = self.item.location();
        let color = self.item.color();
        let support = self.item.support();
        let replacement = self
            .replacement
            .as_deref()
            .unwrap_or(DEFAULT_REPLACEMENT_WORD);

        let subject = match self.domain {
            Domain::Emotion => format!("the trapped emotion of {label}"),
            Domain::Allergy => format!("all sensitivity to {label}"),
            Domain::Belief => format!("the belief that {label}"),
        };

        let body = match step {
            RitualStep::Intention => format!(
                "Place your hand on your {location} and speak aloud: \
                 \"I am ready to release {subject}. I choose healing and freedom.\""
            ),
            RitualStep::Release => format!(
                "Swipe down your central meridian three times, saying: \
                 \"With each swipe, I release {label} from my being.\""
            ),
            RitualStep::Replace => format!(
                "Choose a high vibration word to fill the space {label} held, \
                 or continue to accept {DEFAULT_REPLACEMENT_WORD}."
            ),
            RitualStep::ColorWork => format!(
                "Visualize {color} light filling your {location}. Breathe in this \
                 energy and let {replacement} settle where {label} lived."
            ),
            RitualStep::Seal => format!(
                "Additional support: {support}. Color to work with: {color}. \
                 Seal with: \"This healing is complete. I am free from {label} \
                 and I carry {replacement} with me.\""
            ),
        };

        Some(StepPrompt {
            step,
            title: step.title().to_string(),
            body,
        })
    }
}
