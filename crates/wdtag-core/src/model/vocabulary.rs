//! Tag vocabulary loading from `selected_tags.csv`.
//!
//! Rows look like `<tag_id>,<name>,<category>,<count>`. Category `0` rows are
//! general tags, category `4` rows are character tags; every other category
//! (ratings included) is ignored. Order within each list follows the file,
//! which is also the order of the model's output positions.

use std::path::Path;

/// CSV category code for general tags.
const CATEGORY_GENERAL: i64 = 0;

/// CSV category code for character tags.
const CATEGORY_CHARACTER: i64 = 4;

/// First field of the header row.
const HEADER_FIRST_FIELD: &str = "tag_id";

/// General and character tag names, index-aligned to model outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagVocabulary {
    pub general: Vec<String>,
    pub character: Vec<String>,
}

impl TagVocabulary {
    /// Read and parse a vocabulary file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let vocabulary = Self::parse(&content);
        tracing::debug!(
            "Loaded vocabulary from {:?}: {} general, {} character",
            path,
            vocabulary.general.len(),
            vocabulary.character.len()
        );
        Ok(vocabulary)
    }

    /// Parse vocabulary CSV content. Malformed rows are skipped silently.
    pub fn parse(content: &str) -> Self {
        let mut vocabulary = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(HEADER_FIRST_FIELD) {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 4 {
                continue;
            }
            let Ok(category) = fields[2].trim().parse::<i64>() else {
                continue;
            };

            let tag = fields[1].trim().to_string();
            match category {
                CATEGORY_GENERAL => vocabulary.general.push(tag),
                CATEGORY_CHARACTER => vocabulary.character.push(tag),
                _ => {}
            }
        }

        vocabulary
    }

    /// Total number of usable tags.
    pub fn len(&self) -> usize {
        self.general.len() + self.character.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
