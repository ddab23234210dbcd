//! Story templates: the 17-field, semicolon-delimited rows every condition
//! is spliced from.
//!
//! Columns are resolved by name. A file may begin with a header row naming
//! the columns in any order; headerless files use [`COLUMNS`] order.

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Canonical column order of a headerless template file.
pub const COLUMNS: [&str; 17] = [
    "story",
    "aware_of_event",
    "not_aware_of_event",
    "action_aware",
    "action_not_aware",
    "belief_question",
    "desire_question",
    "action_question",
    "belief_answer_aware",
    "desire_answer_aware",
    "action_answer_aware",
    "belief_answer_not_aware",
    "desire_answer_not_aware",
    "action_answer_not_aware",
    "random_event",
    "aware_of_random_event",
    "not_aware_of_random_event",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryTemplate {
    pub story: String,
    pub aware_of_event: String,
    pub not_aware_of_event: String,
    pub action_aware: String,
    pub action_not_aware: String,
    pub belief_question: String,
    pub desire_question: String,
    pub action_question: String,
    pub belief_answer_aware: String,
    pub desire_answer_aware: String,
    pub action_answer_aware: String,
    pub belief_answer_not_aware: String,
    pub desire_answer_not_aware: String,
    pub action_answer_not_aware: String,
    pub random_event: String,
    pub aware_of_random_event: String,
    pub not_aware_of_random_event: String,
}

impl StoryTemplate {
    /// Returns the value of the named column.
    pub fn field(&self, column: &str) -> Option<&str> {
        let value = match column {
            "story" => &self.story,
            "aware_of_event" => &self.aware_of_event,
            "not_aware_of_event" => &self.not_aware_of_event,
            "action_aware" => &self.action_aware,
            "action_not_aware" => &self.action_not_aware,
            "belief_question" => &self.belief_question,
            "desire_question" => &self.desire_question,
            "action_question" => &self.action_question,
            "belief_answer_aware" => &self.belief_answer_aware,
            "desire_answer_aware" => &self.desire_answer_aware,
            "action_answer_aware" => &self.action_answer_aware,
            "belief_answer_not_aware" => &self.belief_answer_not_aware,
            "desire_answer_not_aware" => &self.desire_answer_not_aware,
            "action_answer_not_aware" => &self.action_answer_not_aware,
            "random_event" => &self.random_event,
            "aware_of_random_event" => &self.aware_of_random_event,
            "not_aware_of_random_event" => &self.not_aware_of_random_event,
            _ => return None,
        };
        Some(value.as_str())
    }

    fn field_mut(&mut self, column: &str) -> Option<&mut String> {
        let value = match column {
            "story" => &mut self.story,
            "aware_of_event" => &mut self.aware_of_event,
            "not_aware_of_event" => &mut self.not_aware_of_event,
            "action_aware" => &mut self.action_aware,
            "action_not_aware" => &mut self.action_not_aware,
            "belief_question" => &mut self.belief_question,
            "desire_question" => &mut self.desire_question,
            "action_question" => &mut self.action_question,
            "belief_answer_aware" => &mut self.belief_answer_aware,
            "desire_answer_aware" => &mut self.desire_answer_aware,
            "action_answer_aware" => &mut self.action_answer_aware,
            "belief_answer_not_aware" => &mut self.belief_answer_not_aware,
            "desire_answer_not_aware" => &mut self.desire_answer_not_aware,
            "action_answer_not_aware" => &mut self.action_answer_not_aware,
            "random_event" => &mut self.random_event,
            "aware_of_random_event" => &mut self.aware_of_random_event,
            "not_aware_of_random_event" => &mut self.not_aware_of_random_event,
            _ => return None,
        };
        Some(value)
    }

    /// Builds a template from `(column, value)` pairs. Every column in
    /// [`COLUMNS`] must be present.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut template = StoryTemplate::default();
        let mut seen = [false; COLUMNS.len()];

        for (column, value) in pairs {
            let Some(slot) = template.field_mut(column) else {
                continue;
            };
            *slot = value.to_string();
            if let Some(i) = COLUMNS.iter().position(|c| *c == column) {
                seen[i] = true;
            }
        }

        let missing: Vec<&str> = COLUMNS
            .iter()
            .zip(seen)
            .filter(|(_, s)| !s)
            .map(|(c, _)| *c)
            .collect();
        if !missing.is_empty() {
            bail!("story template is missing columns: {}", missing.join(", "));
        }

        Ok(template)
    }

    /// Values in canonical column order, as written to a template file.
    pub fn to_row(&self) -> Vec<&str> {
        COLUMNS
            .iter()
            .map(|c| self.field(c).unwrap_or_default())
            .collect()
    }
}

/// Maps each canonical column to its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnLayout {
    positions: [usize; COLUMNS.len()],
}

impl ColumnLayout {
    fn canonical() -> Self {
        let mut positions = [0; COLUMNS.len()];
        for (i, p) in positions.iter_mut().enumerate() {
            *p = i;
        }
        Self { positions }
    }

    /// Recognises a header row: every canonical column name appears in it.
    fn from_header(record: &StringRecord) -> Option<Self> {
        let names: Vec<String> = record
            .iter()
            .map(|f| f.trim().to_lowercase().replace(' ', "_"))
            .collect();

        let mut positions = [0; COLUMNS.len()];
        for (i, column) in COLUMNS.iter().enumerate() {
            positions[i] = names.iter().position(|n| n == column)?;
        }
        Some(Self { positions })
    }

    fn min_len(&self) -> usize {
        self.positions.iter().max().map_or(0, |m| m + 1)
    }
}

/// Reads templates from any semicolon-delimited source.
pub fn parse_templates<R: Read>(reader: R) -> Result<Vec<StoryTemplate>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut layout: Option<ColumnLayout> = None;
    let mut templates = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("reading template row {}", line + 1))?;

        if layout.is_none() {
            if let Some(header) = ColumnLayout::from_header(&record) {
                debug!("template file has a header row");
                layout = Some(header);
                continue;
            }
        }
        let layout = layout.get_or_insert_with(ColumnLayout::canonical);

        if record.len() < layout.min_len() {
            bail!(
                "template row {} has {} fields, expected at least {}",
                line + 1,
                record.len(),
                layout.min_len()
            );
        }

        let pairs = COLUMNS
            .iter()
            .zip(layout.positions)
            .map(|(column, pos)| (*column, record.get(pos).unwrap_or_default()));
        templates.push(StoryTemplate::from_pairs(pairs)?);
    }

    Ok(templates)
}

/// Loads every template in a file.
pub fn load_templates(path: impl AsRef<Path>) -> Result<Vec<StoryTemplate>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening template file {}", path.display()))?;
    let templates = parse_templates(file)?;
    debug!(path = %path.display(), count = templates.len(), "Loaded story templates");
    Ok(templates)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A complete template in the shape of the study's stories.
    pub(crate) fn kofi() -> StoryTemplate {
        StoryTemplate {
            story: "Kofi is a fisherman from a small village in Ghana. He wants to catch enough fish today. \
Kofi repaired his fishing net last night. Kofi believes his net is in good condition. \
A group of monkeys comes and tears the fishing net apart."
                .to_string(),
            aware_of_event: "Kofi sees the monkeys damaging his fishing net.".to_string(),
            not_aware_of_event: "Kofi does not see the monkeys damaging his fishing net.".to_string(),
            action_aware: "Kofi fixes the net before heading out.".to_string(),
            action_not_aware: "Kofi heads out to sea with the net.".to_string(),
            belief_question: "Does Kofi believe his fishing net is in good condition or torn apart?".to_string(),
            desire_question: "What does Kofi want to do?".to_string(),
            action_question: "What will Kofi do?".to_string(),
            belief_answer_aware: "Kofi believes his fishing net is torn apart.".to_string(),
            desire_answer_aware: "Kofi wants to catch fish.".to_string(),
            action_answer_aware: "Kofi will repair the net.".to_string(),
            belief_answer_not_aware: "Kofi believes his fishing net is in good condition.".to_string(),
            desire_answer_not_aware: "Kofi wants to catch fish.".to_string(),
            action_answer_not_aware: "Kofi will go fishing.".to_string(),
            random_event: "A seagull lands on the boat.".to_string(),
            aware_of_random_event: "Kofi sees the seagull.".to_string(),
            not_aware_of_random_event: "Kofi does not see the seagull.".to_string(),
        }
    }

    fn headerless_line(t: &StoryTemplate) -> String {
        t.to_row().join(";")
    }

    #[test]
    fn test_parse_headerless_uses_canonical_order() {
        let input = headerless_line(&kofi());
        let templates = parse_templates(input.as_bytes()).unwrap();
        assert_eq!(templates, vec![kofi()]);
    }

    #[test]
    fn test_parse_header_in_any_order() {
        let t = kofi();
        let mut columns: Vec<&str> = COLUMNS.to_vec();
        columns.reverse();
        let header = columns.join(";");
        let row: Vec<&str> = columns.iter().map(|c| t.field(c).unwrap()).collect();
        let input = format!("{}\n{}\n", header, row.join(";"));

        let templates = parse_templates(input.as_bytes()).unwrap();
        assert_eq!(templates, vec![t]);
    }

    #[test]
    fn test_extra_trailing_columns_are_ignored() {
        let input = format!("{};auto;0", headerless_line(&kofi()));
        let templates = parse_templates(input.as_bytes()).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].not_aware_of_random_event, "Kofi does not see the seagull.");
    }

    #[test]
    fn test_short_row_is_an_error() {
        let input = "a story;aware;not aware";
        let err = parse_templates(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("expected at least 17"));
    }

    #[test]
    fn test_from_pairs_reports_missing_columns() {
        let err = StoryTemplate::from_pairs([("story", "x")]).unwrap_err();
        assert!(err.to_string().contains("aware_of_event"));
    }
}
