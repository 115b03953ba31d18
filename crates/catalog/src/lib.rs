//! Dataset parsing and bucket grouping for the decoder catalogs.
//!
//! Pure functions over delimited text; no I/O. Fetching lives in the
//! client, serving in the server, and both lean on this crate for the
//! row shapes and the six-bucket layout.

use serde::{Deserialize, Serialize};
use shared::domain::Domain;

const DELIMITER: char = ',';

/// The six fixed thematic rows every catalog is organized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Row1,
    Row2,
    Row3,
    Row4,
    Row5,
    Row6,
}

impl Bucket {
    pub const ORDER: [Bucket; 6] = [
        Bucket::Row1,
        Bucket::Row2,
        Bucket::Row3,
        Bucket::Row4,
        Bucket::Row5,
        Bucket::Row6,
    ];

    /// Left display column holds rows 1-3, right column rows 4-6.
    pub const LEFT: [Bucket; 3] = [Bucket::Row1, Bucket::Row2, Bucket::Row3];
    pub const RIGHT: [Bucket; 3] = [Bucket::Row4, Bucket::Row5, Bucket::Row6];

    pub fn from_label(label: &str) -> Option<Bucket> {
        Bucket::ORDER.into_iter().find(|b| b.label() == label)
    }

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Row1 => "Row 1",
            Bucket::Row2 => "Row 2",
            Bucket::Row3 => "Row 3",
            Bucket::Row4 => "Row 4",
            Bucket::Row5 => "Row 5",
            Bucket::Row6 => "Row 6",
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Bucket::Row1 => 1,
            Bucket::Row2 => 2,
            Bucket::Row3 => 3,
            Bucket::Row4 => 4,
            Bucket::Row5 => 5,
            Bucket::Row6 => 6,
        }
    }

    pub fn index(self) -> usize {
        self.number() as usize - 1
    }
}

/// Static presentation theme for one bucket; independent of the loaded
/// data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTheme {
    pub title: String,
    pub color: String,
    pub description: String,
}

const THEME_COLORS: [&str; 6] = [
    "#E74C3C", "#F39C12", "#27AE60", "#E67E22", "#3498DB", "#9B59B6",
];

const FALLBACK_COLOR: &str = "#8F5AFF";

/// Theme for a bucket number in the given domain, falling back to a
/// generic theme when the number is unmapped.
pub fn theme_for(domain: Domain, number: u8) -> BucketTheme {
    let slot = match number {
        1..=6 => number as usize - 1,
        _ => {
            return BucketTheme {
                title: format!("Row {number}"),
                color: FALLBACK_COLOR.to_string(),
                description: fallback_description(domain).to_string(),
            }
        }
    };

    let (title, description) = match domain {
        Domain::Emotion => [
            ("Foundation Emotions", "Root chakra - Shame, guilt, unworthiness"),
            ("Fear-Based Emotions", "Solar Plexus - Fear, panic, worry"),
            ("Heart Emotions", "Heart chakra - Grief, loss, loneliness"),
            ("Anger Emotions", "Liver/Fire - Anger, rage, resentment"),
            ("Communication Emotions", "Throat/Heart - Rejection, betrayal"),
            ("Higher Mind Emotions", "Crown/Third Eye - Doubt, confusion"),
        ][slot],
        Domain::Allergy => [
            ("Common Food Intolerances", "Digestive system impacts"),
            ("Environmental Allergens", "Respiratory system triggers"),
            ("Food Allergies", "Immune system reactions"),
            ("Material Sensitivities", "Skin system responses"),
            ("Environmental Patterns", "Nervous system triggers"),
            ("Chemical Sensitivities", "Liver system impacts"),
        ][slot],
        Domain::Belief => [
            ("Self-Worth Beliefs", "Core identity & value beliefs"),
            ("Abundance Beliefs", "Money & success limitations"),
            ("Relationship Beliefs", "Love & connection patterns"),
            ("Personal Growth Beliefs", "Change & learning blocks"),
            ("Health Beliefs", "Body & wellness patterns"),
            ("Safety Beliefs", "World & life security"),
        ][slot],
    };

    BucketTheme {
        title: title.to_string(),
        color: THEME_COLORS[slot].to_string(),
        description: description.to_string(),
    }
}

fn fallback_description(domain: Domain) -> &'static str {
    match domain {
        Domain::Emotion => "Various emotions",
        Domain::Allergy => "Various allergens",
        Domain::Belief => "Various beliefs",
    }
}

/// Headings for the two display columns.
pub fn column_titles(domain: Domain) -> (&'static str, &'static str) {
    match domain {
        Domain::Emotion => ("Foundation & Heart Release", "Fire & Higher Mind Release"),
        Domain::Allergy => ("Food & Environmental Allergies", "Sensitivities & Patterns"),
        Domain::Belief => ("Core Beliefs & Relationships", "Growth & Safety Beliefs"),
    }
}

/// Per-domain descriptive fields of one catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDetails {
    Emotion {
        /// Hawkins-scale value; 0 when the dataset cell is not numeric.
        frequency: i64,
        chakra_body_area: String,
        soulart_color: String,
        additional_support: String,
    },
    Allergy {
        category: String,
        body_system: String,
        color: String,
        healing_support: String,
    },
    Belief {
        category: String,
        vibrational_level: String,
        chakra_area: String,
        color: String,
        healing_support: String,
    },
}

/// One parsed catalog row. `bucket` keeps the raw label from the
/// dataset; rows with labels outside the six known buckets survive
/// parsing and are excluded at bucketize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub bucket: String,
    pub label: String,
    pub details: ItemDetails,
}

impl CatalogItem {
    pub fn domain(&self) -> Domain {
        match self.details {
            ItemDetails::Emotion { .. } => Domain::Emotion,
            ItemDetails::Allergy { .. } => Domain::Allergy,
            ItemDetails::Belief { .. } => Domain::Belief,
        }
    }

    /// Healing color named by the dataset for this item.
    pub fn color(&self) -> &str {
        match &self.details {
            ItemDetails::Emotion { soulart_color, .. } => soulart_color,
            ItemDetails::Allergy { color, .. } => color,
            ItemDetails::Belief { color, .. } => color,
        }
    }

    /// Body or chakra area the session directs attention to.
    pub fn location(&self) -> &str {
        match &self.details {
            ItemDetails::Emotion {
                chakra_body_area, ..
            } => chakra_body_area,
            ItemDetails::Allergy { body_system, .. } => body_system,
            ItemDetails::Belief { chakra_area, .. } => chakra_area,
        }
    }

    pub fn support(&self) -> &str {
        match &self.details {
            ItemDetails::Emotion {
                additional_support, ..
            } => additional_support,
            ItemDetails::Allergy {
                healing_support, ..
            } => healing_support,
            ItemDetails::Belief {
                healing_support, ..
            } => healing_support,
        }
    }

    /// Secondary line shown on the item's tile.
    pub fn subtitle(&self) -> String {
        match &self.details {
            ItemDetails::Emotion { frequency, .. } => format!("{frequency} Hz"),
            ItemDetails::Allergy { category, .. } => category.clone(),
            ItemDetails::Belief {
                vibrational_level, ..
            } => vibrational_level.clone(),
        }
    }
}

/// Minimum field count for a row to be accepted.
pub fn min_columns(domain: Domain) -> usize {
    match domain {
        Domain::Emotion | Domain::Allergy => 6,
        Domain::Belief => 7,
    }
}

/// Parse a whole dataset. The first line is a header and is discarded;
/// blank lines are skipped; rows below the domain's minimum column
/// count are dropped without failing the load.
pub fn parse_catalog(domain: Domain, text: &str) -> Vec<CatalogItem> {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_row(domain, line))
        .collect()
}

fn parse_row(domain: Domain, line: &str) -> Option<CatalogItem> {
    let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    if fields.len() < min_columns(domain) {
        return None;
    }

    let details = match domain {
        Domain::Emotion => ItemDetails::Emotion {
            frequency: fields[2].parse().unwrap_or(0),
            chakra_body_area: fields[3].to_string(),
            soulart_color: fields[4].to_string(),
            additional_support: fields[5].to_string(),
        },
        Domain::Allergy => ItemDetails::Allergy {
            category: fields[2].to_string(),
            body_system: fields[3].to_string(),
            color: fields[4].to_string(),
            healing_support: fields[5].to_string(),
        },
        Domain::Belief => ItemDetails::Belief {
            category: fields[2].to_string(),
            vibrational_level: fields[3].to_string(),
            chakra_area: fields[4].to_string(),
            color: fields[5].to_string(),
            healing_support: fields[6].to_string(),
        },
    };

    Some(CatalogItem {
        bucket: fields[0].to_string(),
        label: fields[1].to_string(),
        details,
    })
}

/// Stable partition of items into the six buckets. Relative order
/// within a bucket follows the input; items with an unrecognized
/// bucket label are excluded.
pub fn bucketize(items: &[CatalogItem]) -> [Vec<CatalogItem>; 6] {
    let mut grouped: [Vec<CatalogItem>; 6] = Default::default();
    for item in items {
        if let Some(bucket) = Bucket::from_label(&item.bucket) {
            grouped[bucket.index()].push(item.clone());
        }
    }
    grouped
}

/// Diagnostic scan used by operator tooling; the runtime loader stays
/// permissive and drops these rows silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetReport {
    pub accepted: usize,
    /// (1-based line number, field count) of rows below the minimum.
    pub short_rows: Vec<(usize, usize)>,
    /// (1-based line number, raw label) of rows with unknown buckets.
    pub unknown_buckets: Vec<(usize, String)>,
}

pub fn scan_dataset(domain: Domain, text: &str) -> DatasetReport {
    let mut report = DatasetReport::default();
    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
        if fields.len() < min_columns(domain) {
            report.short_rows.push((line_no, fields.len()));
            continue;
        }
        if Bucket::from_label(fields[0]).is_none() {
            report
                .unknown_buckets
                .push((line_no, fields[0].to_string()));
            continue;
        }
        report.accepted += 1;
    }
    report
}
