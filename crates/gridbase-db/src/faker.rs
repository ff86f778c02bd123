// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Deterministic synthetic record values for bulk inserts and demo data.

use gridbase_app::color;
use gridbase_app::field_kind;
use gridbase_app::{CellValue, Field, FieldType, RecordValues};
use time::{Date, Duration, Month};

const STATUSES: [&str; 5] = ["Not Started", "In Progress", "Review", "Done", "Blocked"];
const PRIORITIES: [&str; 4] = ["Low", "Medium", "High", "Urgent"];
const CATEGORIES: [&str; 5] = ["Bug", "Feature", "Task", "Epic", "Story"];

const FIRST_NAMES: [&str; 16] = [
    "Ava", "Ben", "Chloe", "Diego", "Elena", "Farah", "Gus", "Hana", "Ivan", "Jade", "Kofi",
    "Lena", "Mateo", "Nia", "Omar", "Priya",
];
const LAST_NAMES: [&str; 16] = [
    "Alvarez", "Brooks", "Chen", "Dubois", "Evans", "Fischer", "Garcia", "Haddad", "Ito",
    "Jensen", "Kowalski", "Lopez", "Moreau", "Nakamura", "Okafor", "Patel",
];
const WORDS: [&str; 30] = [
    "launch", "review", "design", "budget", "roadmap", "sprint", "feedback", "customer",
    "release", "audit", "migrate", "onboard", "metrics", "survey", "pricing", "partner",
    "draft", "deploy", "support", "backlog", "research", "contract", "invoice", "training",
    "update", "schedule", "campaign", "report", "hiring", "prototype",
];

const REFERENCE_YEAR: i32 = 2026;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

#[derive(Debug, Clone)]
pub struct RecordFaker {
    rng: DeterministicRng,
}

impl RecordFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(if seed == 0 { 1 } else { seed }),
        }
    }

    /// One value per field, chosen by field type and, for text, by name.
    pub fn record_values(&mut self, fields: &[Field], ordinal: usize) -> RecordValues {
        fields
            .iter()
            .map(|field| (field.id, self.value_for(field, ordinal)))
            .collect()
    }

    pub fn value_for(&mut self, field: &Field, ordinal: usize) -> CellValue {
        let name = field.name.to_ascii_lowercase();
        match field.field_type {
            FieldType::ShortText => {
                if name.contains("email") {
                    let first = self.pick(&FIRST_NAMES).to_ascii_lowercase();
                    let last = self.pick(&LAST_NAMES).to_ascii_lowercase();
                    CellValue::Text(format!("{first}.{last}{ordinal}@example.com"))
                } else if name.contains("assignee") || name.contains("owner") {
                    CellValue::Text(self.full_name())
                } else {
                    CellValue::Text(self.title(3))
                }
            }
            FieldType::LongText => CellValue::Text(self.sentence(6, 14)),
            FieldType::SingleSelect => {
                let label = match field.configured_options() {
                    Some(options) => options[self.rng.int_n(options.len())].label.clone(),
                    None if name.contains("priority") => self.pick(&PRIORITIES).to_owned(),
                    None if name.contains("category") => self.pick(&CATEGORIES).to_owned(),
                    None if name.contains("status") => self.pick(&STATUSES).to_owned(),
                    None => {
                        let options = color::select_options(field);
                        options
                            .get(self.rng.int_n(options.len()))
                            .map(|option| option.label.clone())
                            .unwrap_or_default()
                    }
                };
                CellValue::Text(label)
            }
            FieldType::Checkbox => CellValue::Bool(self.rng.bool()),
            FieldType::Date => CellValue::Text(field_kind::format_iso_date(self.date_in_year())),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn full_name(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    fn title(&mut self, words: usize) -> String {
        (0..words)
            .map(|_| {
                let word = self.pick(&WORDS);
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let span = max_words.saturating_sub(min_words) + 1;
        let count = min_words + self.rng.int_n(span);
        let mut sentence = (0..count)
            .map(|_| self.pick(&WORDS))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn date_in_year(&mut self) -> Date {
        let start = Date::from_calendar_date(REFERENCE_YEAR, Month::January, 1)
            .unwrap_or(Date::MIN);
        let offset = self.rng.int_n(365) as i64;
        start.checked_add(Duration::days(offset)).unwrap_or(start)
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordFaker, STATUSES};
    use gridbase_app::field_kind;
    use gridbase_app::{CellValue, Field, FieldConfig, FieldId, FieldType, TableId};
    use time::OffsetDateTime;

    fn field(id: i64, name: &str, field_type: FieldType) -> Field {
        Field {
            id: FieldId::new(id),
            table_id: TableId::new(1),
            name: name.to_owned(),
            field_type,
            order_index: id,
            config: FieldConfig::default(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn same_seed_same_values() {
        let fields = vec![
            field(1, "Name", FieldType::ShortText),
            field(2, "Status", FieldType::SingleSelect),
            field(3, "Due", FieldType::Date),
        ];
        let first = RecordFaker::new(42).record_values(&fields, 1);
        let second = RecordFaker::new(42).record_values(&fields, 1);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn values_fit_their_fields() {
        let fields = vec![
            field(1, "Name", FieldType::ShortText),
            field(2, "Email", FieldType::ShortText),
            field(3, "Status", FieldType::SingleSelect),
            field(4, "Done", FieldType::Checkbox),
            field(5, "Due", FieldType::Date),
            field(6, "Notes", FieldType::LongText),
        ];
        let mut faker = RecordFaker::new(7);
        for ordinal in 1..50 {
            let values = faker.record_values(&fields, ordinal);
            for field in &fields {
                let value = &values[&field.id];
                assert!(field_kind::validate(field, value).is_ok(), "{value:?}");
            }
            let status = values[&FieldId::new(3)].as_text().unwrap_or_default();
            assert!(STATUSES.contains(&status));
            assert!(
                values[&FieldId::new(2)]
                    .as_text()
                    .is_some_and(|email| email.ends_with(&format!("{ordinal}@example.com")))
            );
            assert!(matches!(values[&FieldId::new(4)], CellValue::Bool(_)));
        }
    }
}
