use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::SubjectCatalog;

/// Max-marks/credits configuration for one subject, resolved by the catalog.
/// Maxes are kept in the storage width; construction clamps them non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkScheme {
    pub max_internal: i64,
    pub max_external: i64,
    pub credits: f64,
}

impl MarkScheme {
    pub fn max_total(&self) -> i64 {
        self.max_internal.saturating_add(self.max_external)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassStatus {
    Pass,
    Fail,
    /// Absent: both components zero on a scored subject.
    Ab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
    Y,
    F,
}

impl Grade {
    pub fn points(self) -> f64 {
        match self {
            Grade::S => 10.0,
            Grade::A => 9.0,
            Grade::B => 8.0,
            Grade::C => 7.0,
            Grade::D => 6.0,
            Grade::Y => 5.0,
            Grade::F => 0.0,
        }
    }

    /// Letter grade from percentage, inclusive lower bounds.
    pub fn from_percentage(percentage: f64) -> Grade {
        if percentage >= 90.0 {
            Grade::S
        } else if percentage >= 80.0 {
            Grade::A
        } else if percentage >= 70.0 {
            Grade::B
        } else if percentage >= 60.0 {
            Grade::C
        } else if percentage >= 50.0 {
            Grade::D
        } else if percentage >= 40.0 {
            Grade::Y
        } else {
            Grade::F
        }
    }
}

/// Clamp a raw mark component to the non-negative range; absent means 0.
/// Marks stay in the storage width end to end, so no value is ever narrowed.
pub fn normalize_mark(raw: Option<i64>) -> i64 {
    raw.unwrap_or(0).max(0)
}

/// Pass/fail decision for one subject. The component bounds are independent of
/// the grade breakpoints: a student can clear 40% overall and still fail on a
/// component bound, or on the standard-theory override. Total on any numeric
/// input, however far out of range.
pub fn pass_status(internal: i64, external: i64, scheme: &MarkScheme) -> PassStatus {
    let total = internal.saturating_add(external);
    if total == 0 && scheme.max_total() > 0 {
        return PassStatus::Ab;
    }

    let total_pass = scheme.max_total() as f64 * 0.4;
    let int_pass: i64 = if scheme.max_internal == 60 { 24 } else { 15 };
    let ext_pass: i64 = if scheme.max_external == 140 { 56 } else { 25 };

    // A zero-max component auto-passes (pure-external and pure-internal subjects).
    let passed_internal = scheme.max_internal == 0 || internal >= int_pass;
    let passed_external = scheme.max_external == 0 || external >= ext_pass;

    let standard_theory = scheme.max_internal == 30 && scheme.max_external == 70;
    let special_case_fail = standard_theory && internal <= 10 && external < 30;

    if passed_internal && passed_external && total as f64 >= total_pass && !special_case_fail {
        PassStatus::Pass
    } else {
        PassStatus::Fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedDetail {
    pub subject: String,
    pub semester: i64,
    pub is_lab: bool,
    pub internal_marks: i64,
    pub external_marks: i64,
    pub total_marks: i64,
    pub max_marks: i64,
    pub percentage: f64,
    pub grade: Grade,
    pub grade_points: f64,
    pub pass_status: PassStatus,
    pub credits_offered: f64,
    pub credits_earned: f64,
    pub used_default_scheme: bool,
}

/// Grade one subject. Total and side-effect free: any scheme and any clamped
/// mark pair yields a detail record.
///
/// Grade points and credits earned are gated on Pass so that marks which clear
/// a grade breakpoint but fail a component bound contribute nothing to GPA.
pub fn grade_subject(
    subject: impl Into<String>,
    semester: i64,
    is_lab: bool,
    internal: i64,
    external: i64,
    scheme: &MarkScheme,
    used_default_scheme: bool,
) -> GradedDetail {
    let total = internal.saturating_add(external);
    let max_total = scheme.max_total();
    let percentage = if max_total > 0 {
        total as f64 / max_total as f64 * 100.0
    } else {
        0.0
    };
    let grade = Grade::from_percentage(percentage);
    let status = pass_status(internal, external, scheme);
    let grade_points = if status == PassStatus::Pass {
        grade.points()
    } else {
        0.0
    };
    let credits_earned = if status == PassStatus::Pass {
        scheme.credits
    } else {
        0.0
    };

    GradedDetail {
        subject: subject.into(),
        semester,
        is_lab,
        internal_marks: internal,
        external_marks: external,
        total_marks: total,
        max_marks: max_total,
        percentage,
        grade,
        grade_points,
        pass_status: status,
        credits_offered: scheme.credits,
        credits_earned,
        used_default_scheme,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub semester: i64,
    pub total_marks: i64,
    pub total_max_marks: i64,
    pub credits_offered: f64,
    pub credits_earned: f64,
    /// Sum of gradePoints * creditsOffered over the semester's subjects.
    pub credit_points: f64,
    pub has_fail: bool,
}

pub fn aggregate_semester(semester: i64, details: &[GradedDetail]) -> SemesterSummary {
    let mut out = SemesterSummary {
        semester,
        total_marks: 0,
        total_max_marks: 0,
        credits_offered: 0.0,
        credits_earned: 0.0,
        credit_points: 0.0,
        has_fail: false,
    };
    for d in details {
        out.total_marks = out.total_marks.saturating_add(d.total_marks);
        out.total_max_marks = out.total_max_marks.saturating_add(d.max_marks);
        out.credits_offered += d.credits_offered;
        out.credits_earned += d.credits_earned;
        out.credit_points += d.grade_points * d.credits_offered;
        // Ab does not flip the aggregate flag; only a graded Fail does.
        if d.pass_status == PassStatus::Fail {
            out.has_fail = true;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub total_marks: i64,
    pub total_max_marks: i64,
    pub credits_offered: f64,
    pub credits_earned: f64,
    pub cgpa: f64,
    pub overall_percentage: f64,
    pub overall_pass: bool,
}

/// Fold semester summaries for a contiguous semester range into one overall
/// record. Callers decide the range (a second-year student aggregates
/// semesters 1..=4, not 5..=8).
pub fn aggregate_overall(summaries: &[SemesterSummary]) -> OverallSummary {
    let mut total_marks = 0_i64;
    let mut total_max_marks = 0_i64;
    let mut credits_offered = 0.0_f64;
    let mut credits_earned = 0.0_f64;
    let mut credit_points = 0.0_f64;
    let mut has_fail = false;

    for s in summaries {
        total_marks = total_marks.saturating_add(s.total_marks);
        total_max_marks = total_max_marks.saturating_add(s.total_max_marks);
        credits_offered += s.credits_offered;
        credits_earned += s.credits_earned;
        credit_points += s.credit_points;
        has_fail = has_fail || s.has_fail;
    }

    let overall_percentage = if total_max_marks > 0 {
        total_marks as f64 / total_max_marks as f64 * 100.0
    } else {
        0.0
    };
    // With no credits offered yet (no marks entered), CGPA degrades to the
    // percentage scale divided by ten.
    let cgpa = if credits_offered > 0.0 {
        credit_points / credits_offered
    } else {
        overall_percentage / 10.0
    };

    OverallSummary {
        total_marks,
        total_max_marks,
        credits_offered,
        credits_earned,
        cgpa,
        overall_percentage,
        overall_pass: !has_fail,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDistribution {
    pub above_90: usize,
    pub above_80: usize,
    pub above_70: usize,
    pub above_60: usize,
    pub above_50: usize,
    pub above_40: usize,
    pub below_40: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortAnalytics {
    pub total_students: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_percentage: f64,
    pub fail_percentage: f64,
    pub score_distribution: ScoreDistribution,
}

/// Cohort statistics over per-student overall summaries. The distribution is
/// cumulative: a student at 92% counts in every >= bracket down to above40.
pub fn aggregate_cohort<'a, I>(students: I) -> CohortAnalytics
where
    I: IntoIterator<Item = &'a OverallSummary>,
{
    let mut total = 0_usize;
    let mut pass_count = 0_usize;
    let mut dist = ScoreDistribution::default();

    for s in students {
        total += 1;
        if s.overall_pass {
            pass_count += 1;
        }
        let pct = s.overall_percentage;
        if pct >= 90.0 {
            dist.above_90 += 1;
        }
        if pct >= 80.0 {
            dist.above_80 += 1;
        }
        if pct >= 70.0 {
            dist.above_70 += 1;
        }
        if pct >= 60.0 {
            dist.above_60 += 1;
        }
        if pct >= 50.0 {
            dist.above_50 += 1;
        }
        if pct >= 40.0 {
            dist.above_40 += 1;
        }
        if pct < 40.0 {
            dist.below_40 += 1;
        }
    }

    let fail_count = total - pass_count;
    let (pass_percentage, fail_percentage) = if total > 0 {
        (
            pass_count as f64 / total as f64 * 100.0,
            fail_count as f64 / total as f64 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    CohortAnalytics {
        total_students: total,
        pass_count,
        fail_count,
        pass_percentage,
        fail_percentage,
        score_distribution: dist,
    }
}

/// One persisted raw score row, as read from a marks partition.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMarkRecord {
    pub semester: i64,
    pub subject_name: String,
    pub is_lab: bool,
    pub internal_marks: Option<i64>,
    pub external_marks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterResult {
    pub semester: i64,
    pub details: Vec<GradedDetail>,
    pub summary: SemesterSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub semesters: Vec<SemesterResult>,
    pub overall: OverallSummary,
}

/// Grade one student's raw rows against a catalog snapshot. This is the single
/// grading path shared by the student dashboard and the cohort analytics, so
/// the two views can never drift apart.
///
/// Only semesters 1..=semesters_to_show participate; a second-year student
/// aggregates semesters 1..=4 even if stray rows exist outside that range.
pub fn grade_student(
    records: &[RawMarkRecord],
    catalog: &SubjectCatalog,
    semesters_to_show: i64,
) -> StudentResult {
    let mut by_semester: BTreeMap<i64, Vec<GradedDetail>> = BTreeMap::new();
    for r in records {
        if r.semester < 1 || r.semester > semesters_to_show {
            continue;
        }
        let resolved = catalog.resolve(r.semester, &r.subject_name, r.is_lab);
        let detail = grade_subject(
            r.subject_name.clone(),
            r.semester,
            r.is_lab,
            normalize_mark(r.internal_marks),
            normalize_mark(r.external_marks),
            &resolved.scheme,
            resolved.used_default,
        );
        by_semester.entry(r.semester).or_default().push(detail);
    }

    let semesters: Vec<SemesterResult> = by_semester
        .into_iter()
        .map(|(semester, details)| {
            let summary = aggregate_semester(semester, &details);
            SemesterResult {
                semester,
                details,
                summary,
            }
        })
        .collect();
    let summaries: Vec<SemesterSummary> = semesters.iter().map(|s| s.summary.clone()).collect();
    let overall = aggregate_overall(&summaries);

    StudentResult { semesters, overall }
}
