use std::collections::HashMap;

use crate::grading::MarkScheme;

pub const DEFAULT_MAX_INTERNAL: i64 = 30;
pub const DEFAULT_MAX_EXTERNAL: i64 = 70;
pub const DEFAULT_THEORY_CREDITS: f64 = 3.0;
pub const DEFAULT_LAB_CREDITS: f64 = 1.5;

/// One configured subject scheme, as loaded from the subjects table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub semester: i64,
    pub name: String,
    pub is_lab: bool,
    pub max_internal: i64,
    pub max_external: i64,
    pub credits: f64,
}

/// Subject names drift in case and whitespace between entry paths; fold both
/// before using a name as a lookup key.
pub fn normalize_subject_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedScheme {
    pub scheme: MarkScheme,
    pub used_default: bool,
}

/// Immutable snapshot of the configured subject schemes. Built once per
/// request from the subjects table and passed into the grading path, so the
/// engine never reaches for ambient state.
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    entries: HashMap<(i64, String, bool), CatalogEntry>,
}

impl SubjectCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut map = HashMap::new();
        for e in entries {
            let key = (e.semester, normalize_subject_key(&e.name), e.is_lab);
            map.insert(key, e);
        }
        Self { entries: map }
    }

    pub fn default_scheme(is_lab: bool) -> MarkScheme {
        MarkScheme {
            max_internal: DEFAULT_MAX_INTERNAL,
            max_external: DEFAULT_MAX_EXTERNAL,
            credits: if is_lab {
                DEFAULT_LAB_CREDITS
            } else {
                DEFAULT_THEORY_CREDITS
            },
        }
    }

    /// Total lookup: an unknown (semester, name, lab) combination resolves to
    /// the default scheme rather than failing. The flag on the result lets
    /// callers surface the fallback.
    pub fn resolve(&self, semester: i64, name: &str, is_lab: bool) -> ResolvedScheme {
        let key = (semester, normalize_subject_key(name), is_lab);
        match self.entries.get(&key) {
            Some(e) => ResolvedScheme {
                scheme: MarkScheme {
                    max_internal: e.max_internal,
                    max_external: e.max_external,
                    credits: e.credits,
                },
                used_default: false,
            },
            None => ResolvedScheme {
                scheme: Self::default_scheme(is_lab),
                used_default: true,
            },
        }
    }
}

/// Enrollment-batch prefix to academic-year map, loaded from the batches
/// table. The pairing rotates yearly, so it is data rather than a constant.
#[derive(Debug, Clone, Default)]
pub struct BatchMap {
    by_prefix: HashMap<String, i64>,
    by_year: HashMap<i64, String>,
}

impl BatchMap {
    pub fn new(pairs: Vec<(String, i64)>) -> Self {
        let mut by_prefix = HashMap::new();
        let mut by_year = HashMap::new();
        for (prefix, year) in pairs {
            by_prefix.insert(prefix.clone(), year);
            by_year.insert(year, prefix);
        }
        Self { by_prefix, by_year }
    }

    /// Configured prefixes in a stable order, for partition-table creation.
    pub fn prefixes(&self) -> Vec<String> {
        let mut out: Vec<String> = self.by_prefix.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn prefix_for_year(&self, year: i64) -> Option<&str> {
        self.by_year.get(&year).map(|s| s.as_str())
    }

    pub fn year_for_student(&self, student_id: &str) -> Option<i64> {
        let prefix = student_id.get(0..2)?;
        self.by_prefix.get(prefix).copied()
    }

    /// Name of the marks partition table for a student id. None when the id's
    /// prefix is not a configured batch.
    pub fn marks_table_for_student(&self, student_id: &str) -> Option<String> {
        let prefix = student_id.get(0..2)?;
        if self.by_prefix.contains_key(prefix) {
            Some(format!("marks_{}", prefix))
        } else {
            None
        }
    }

    /// Academic year and marks partition for a student id, in one lookup.
    pub fn cohort_for_student(&self, student_id: &str) -> Option<(i64, String)> {
        let year = self.year_for_student(student_id)?;
        let table = self.marks_table_for_student(student_id)?;
        Some((year, table))
    }

    pub fn marks_table_for_year(&self, year: i64) -> Option<String> {
        self.prefix_for_year(year)
            .map(|prefix| format!("marks_{}", prefix))
    }

    /// A year-N student has results for semesters 1..=2N.
    pub fn semesters_for_year(year: i64) -> i64 {
        year * 2
    }
}
