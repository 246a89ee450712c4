//! Grouping of coverage reports into per-run, per-package and per-PR
//! rollups, plus the coverage trend series.
//!
//! Every function here is pure: reports are borrowed, never modified, and
//! the same input always yields the same output.
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{
    mean_present, rate, CoverageReport, PackageGroup, PrGroup, RunGroup, TrendPoint,
};

/// Bucket items by key, keeping buckets in first-seen order.
fn bucket_by<'a, K, F>(reports: &'a [CoverageReport], key: F) -> Vec<(K, Vec<&'a CoverageReport>)>
where
    K: std::hash::Hash + Eq + Clone,
    F: Fn(&'a CoverageReport) -> Option<K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut buckets: Vec<(K, Vec<&CoverageReport>)> = Vec::new();
    for report in reports {
        let Some(k) = key(report) else {
            continue;
        };
        match index.get(&k) {
            Some(&i) => buckets[i].1.push(report),
            None => {
                index.insert(k.clone(), buckets.len());
                buckets.push((k, vec![report]));
            }
        }
    }
    buckets
}

/// Sort key for an ISO timestamp.
///
/// Unparsable values sort before every parsable one, in string order among
/// themselves. Equal instants written differently are tie-broken by string.
#[must_use]
pub fn timestamp_key(timestamp: &str) -> (Option<DateTime<Utc>>, &str) {
    let instant = DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.with_timezone(&Utc));
    (instant, timestamp)
}

/// Compare two ISO timestamps chronologically. Total over all strings.
#[must_use]
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    timestamp_key(a).cmp(&timestamp_key(b))
}

/// Day-granularity label (`YYYY-MM-DD`) for an ISO timestamp.
#[must_use]
pub fn day_of(timestamp: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }
    let head: String = timestamp.chars().take(10).collect();
    match NaiveDate::parse_from_str(&head, "%Y-%m-%d") {
        Ok(d) => d.format("%Y-%m-%d").to_string(),
        Err(_) => head,
    }
}

fn latest<'a>(reports: &[&'a CoverageReport]) -> &'a str {
    reports
        .iter()
        .map(|r| r.created_at.as_str())
        .max_by_key(|ts| timestamp_key(*ts))
        .unwrap_or_default()
}

/// Group reports by `runId`, in first-seen order.
///
/// Scalar fields (`runMode`, `branch`, `commitSha`, model, `createdAt`) come
/// from the first report of each run and are not checked for consistency.
#[must_use]
pub fn group_by_run(reports: &[CoverageReport]) -> Vec<RunGroup> {
    bucket_by(reports, |r| Some(r.run_id.clone()))
        .into_iter()
        .map(|(run_id, members)| {
            let first = members[0];
            RunGroup {
                run_id,
                run_mode: first.run_mode.clone(),
                branch: first.branch.clone(),
                commit_sha: first.commit_sha.clone(),
                model: first.llm_model.clone(),
                created_at: first.created_at.clone(),
                report_count: members.len(),
                total_tests: members.iter().map(|r| r.tests_generated).sum(),
                total_passed: members.iter().map(|r| r.tests_passed).sum(),
                total_failed: members.iter().map(|r| r.tests_failed).sum(),
                total_tokens: members
                    .iter()
                    .map(|r| r.llm_total_tokens.unwrap_or(0))
                    .sum(),
                total_cost: members.iter().map(|r| r.llm_cost_usd.unwrap_or(0.0)).sum(),
                avg_coverage: mean_present(members.iter().map(|r| r.overall_coverage)),
            }
        })
        .collect()
}

/// Group reports by package (`"root"` when unset), best coverage first.
#[must_use]
pub fn group_by_package(reports: &[CoverageReport]) -> Vec<PackageGroup> {
    let mut groups: Vec<PackageGroup> = bucket_by(reports, |r| Some(r.package_key().to_string()))
        .into_iter()
        .map(|(package_id, members)| {
            let total_tests: u64 = members.iter().map(|r| r.tests_generated).sum();
            let total_passed: u64 = members.iter().map(|r| r.tests_passed).sum();
            PackageGroup {
                package_id,
                report_count: members.len(),
                total_tests,
                total_passed,
                avg_coverage: mean_present(members.iter().map(|r| r.overall_coverage)) * 100.0,
                pass_rate: rate(total_passed, total_tests) * 100.0,
                latest_date: latest(&members).to_string(),
            }
        })
        .collect();
    groups.sort_by(|a, b| b.avg_coverage.total_cmp(&a.avg_coverage));
    groups
}

/// Group reports by pull request, most recent activity first. Reports
/// without a PR number are left out.
#[must_use]
pub fn group_by_pr(reports: &[CoverageReport]) -> Vec<PrGroup> {
    let mut groups: Vec<PrGroup> = bucket_by(reports, |r| r.pr_number)
        .into_iter()
        .map(|(pr_number, members)| {
            let first = members[0];
            let runs: HashSet<&str> = members.iter().map(|r| r.run_id.as_str()).collect();
            PrGroup {
                pr_number,
                pr_url: first.pr_url.clone(),
                branch: first.branch.clone(),
                latest_date: latest(&members).to_string(),
                report_count: members.len(),
                run_count: runs.len(),
                total_tests: members.iter().map(|r| r.tests_generated).sum(),
                total_bugs_found: members.iter().map(|r| r.bugs_found).sum(),
                total_cost: members.iter().map(|r| r.llm_cost_usd.unwrap_or(0.0)).sum(),
                avg_coverage: mean_present(members.iter().map(|r| r.overall_coverage)) * 100.0,
            }
        })
        .collect();
    groups.sort_by(|a, b| compare_timestamps(&b.latest_date, &a.latest_date));
    groups
}

/// Turn a newest-first report list into an oldest-first chart series.
///
/// Reports on the same day stay separate points.
#[must_use]
pub fn build_trend(reports: &[CoverageReport]) -> Vec<TrendPoint> {
    reports
        .iter()
        .rev()
        .map(|r| TrendPoint {
            date: day_of(&r.created_at),
            coverage: r.overall_coverage.unwrap_or(0.0) * 100.0,
            tests_passed: r.tests_passed,
            tests_failed: r.tests_failed,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(run_id: &str, generated: u64, passed: u64, failed: u64, cov: Option<f64>) -> CoverageReport {
        CoverageReport {
            id: format!("{run_id}-{generated}"),
            run_id: run_id.to_string(),
            tests_generated: generated,
            tests_passed: passed,
            tests_failed: failed,
            overall_coverage: cov,
            created_at: "2024-05-01T10:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn run_group_example() {
        let reports = vec![
            report("r1", 10, 9, 1, Some(0.8)),
            report("r1", 5, 5, 0, None),
        ];
        let groups = group_by_run(&reports);
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.run_id, "r1");
        assert_eq!(g.total_tests, 15);
        assert_eq!(g.total_passed, 14);
        assert_eq!(g.total_failed, 1);
        assert_eq!(g.avg_coverage, 0.8);
        assert_eq!(g.report_count, 2);
    }

    #[test]
    fn run_groups_keep_first_seen_order_and_first_scalars() {
        let mut a = report("r2", 1, 1, 0, None);
        a.branch = Some("main".into());
        let mut b = report("r1", 1, 1, 0, None);
        b.branch = Some("dev".into());
        let mut c = report("r2", 1, 1, 0, None);
        c.branch = Some("other".into());
        c.llm_total_tokens = Some(50);
        let groups = group_by_run(&[a, b, c]);
        let ids: Vec<_> = groups.iter().map(|g| g.run_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(groups[0].branch.as_deref(), Some("main"));
        assert_eq!(groups[0].total_tokens, 50);
        assert_eq!(groups[0].avg_coverage, 0.0);
    }

    #[test]
    fn package_pass_rate_handles_zero_tests() {
        let mut a = report("r1", 0, 0, 0, Some(0.5));
        a.package_id = Some("pkg-a".into());
        let mut b = report("r1", 4, 3, 1, Some(0.9));
        b.package_id = None;
        let groups = group_by_package(&[a, b]);
        assert_eq!(groups[0].package_id, "root");
        assert_eq!(groups[0].pass_rate, 75.0);
        assert!((groups[0].avg_coverage - 90.0).abs() < 1e-9);
        assert_eq!(groups[1].package_id, "pkg-a");
        assert_eq!(groups[1].pass_rate, 0.0);
        assert_eq!(groups[1].avg_coverage, 50.0);
    }

    #[test]
    fn pr_groups_skip_reports_without_pr() {
        let mut a = report("r1", 2, 2, 0, Some(0.4));
        a.pr_number = Some(7);
        a.pr_url = Some("https://example.test/pull/7".into());
        a.bugs_found = 2;
        a.llm_cost_usd = Some(0.5);
        a.created_at = "2024-05-01T10:00:00Z".into();
        let mut b = report("r2", 3, 2, 1, Some(0.6));
        b.pr_number = Some(7);
        b.pr_url = Some("https://example.test/other".into());
        b.bugs_found = 1;
        b.created_at = "2024-05-03T10:00:00Z".into();
        let mut c = report("r3", 1, 1, 0, None);
        c.pr_number = Some(9);
        c.created_at = "2024-05-02T10:00:00Z".into();
        let d = report("r4", 100, 100, 0, Some(1.0));

        let groups = group_by_pr(&[a, b, c, d]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].pr_number, 7);
        assert_eq!(groups[0].latest_date, "2024-05-03T10:00:00Z");
        assert_eq!(groups[0].pr_url.as_deref(), Some("https://example.test/pull/7"));
        assert_eq!(groups[0].total_tests, 5);
        assert_eq!(groups[0].total_bugs_found, 3);
        assert_eq!(groups[0].run_count, 2);
        assert!((groups[0].total_cost - 0.5).abs() < 1e-9);
        assert!((groups[0].avg_coverage - 50.0).abs() < 1e-9);
        assert_eq!(groups[1].pr_number, 9);
    }

    #[test]
    fn trend_is_chronological_and_unaggregated() {
        let mut newest = report("r2", 1, 1, 0, None);
        newest.created_at = "2024-05-02T09:00:00Z".into();
        let mut same_day = report("r1", 1, 0, 1, Some(0.5));
        same_day.created_at = "2024-05-02T08:00:00Z".into();
        let mut oldest = report("r0", 1, 1, 0, Some(0.25));
        oldest.created_at = "2024-05-01T23:00:00Z".into();

        let trend = build_trend(&[newest, same_day, oldest]);
        let dates: Vec<_> = trend.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-05-01", "2024-05-02", "2024-05-02"]);
        assert_eq!(trend[0].coverage, 25.0);
        assert_eq!(trend[1].coverage, 50.0);
        assert_eq!(trend[2].coverage, 0.0);
        assert_eq!(trend[1].tests_failed, 1);
    }

    #[test]
    fn mixed_timestamp_formats_order_totally() {
        let x = "2024-05-01T10:00:00+09:00";
        let y = "2024-05-01T05:00:00Z";
        let z = "2024-05-01T07";
        assert_eq!(compare_timestamps(x, y), Ordering::Less);
        assert_eq!(compare_timestamps(z, x), Ordering::Less);
        assert_eq!(compare_timestamps(z, y), Ordering::Less);

        let mut reports = Vec::new();
        for (i, ts) in [x, y, z].iter().enumerate() {
            let mut r = report("run", i as u64, 0, 0, None);
            r.pr_number = Some(i as u64 + 1);
            r.created_at = ts.to_string();
            reports.push(r);
        }
        let dates: Vec<_> = group_by_pr(&reports)
            .into_iter()
            .map(|g| g.latest_date)
            .collect();
        assert_eq!(dates, vec![y, x, z]);
        for pair in dates.windows(2) {
            assert_ne!(compare_timestamps(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn latest_prefers_parsable_dates() {
        let mut a = report("run", 1, 0, 0, None);
        a.pr_number = Some(7);
        a.created_at = "2024-05-01T07".to_string();
        let mut b = a.clone();
        b.created_at = "2024-05-01T05:00:00Z".to_string();
        let groups = group_by_pr(&[a, b]);
        assert_eq!(groups[0].latest_date, "2024-05-01T05:00:00Z");
    }

    #[test]
    fn day_of_falls_back_to_prefix() {
        assert_eq!(day_of("2024-05-02T09:00:00.123+02:00"), "2024-05-02");
        assert_eq!(day_of("2024-05-02 09:00:00"), "2024-05-02");
        assert_eq!(day_of("yesterday"), "yesterday");
    }
}
