//! Structural diff between two resolved models in their JSON form.
//!
//! The walk is pure and synchronous; it is safe to run concurrently across
//! distinct resources.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Cap on recorded paths so a pathological model cannot balloon the report.
const MAX_CHANGED_PATHS: usize = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        self.adds + self.updates + self.removes
    }
}

/// Comparison result between a desired and a current resolved model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedDiff {
    pub summary: DiffSummary,
    /// Dotted paths that differ, in walk order, capped.
    pub changed_paths: Vec<String>,
}

impl ResolvedDiff {
    pub fn has_changes(&self) -> bool {
        self.summary.total() > 0
    }

    /// Human-readable one-liner for logs and task names.
    pub fn describe(&self) -> String {
        if !self.has_changes() {
            return "no changes".to_string();
        }
        let mut s = format!(
            "{} added, {} changed, {} removed",
            self.summary.adds, self.summary.updates, self.summary.removes
        );
        if !self.changed_paths.is_empty() {
            s.push_str(": ");
            s.push_str(&self.changed_paths.join(", "));
        }
        s
    }
}

/// Compare desired against current. Pass `Json::Null` as `current` when the
/// resource does not exist downstream yet; every desired field then counts as
/// an add.
pub fn diff_resolved(desired: &Json, current: &Json) -> ResolvedDiff {
    fn record(out: &mut ResolvedDiff, path: &str) {
        if out.changed_paths.len() < MAX_CHANGED_PATHS {
            out.changed_paths.push(path.to_string());
        }
    }

    fn child(path: &str, key: &str) -> String {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", path, key)
        }
    }

    fn walk(a: &Json, b: &Json, path: &str, out: &mut ResolvedDiff) {
        use serde_json::Value as V;
        match (a, b) {
            (V::Object(ao), V::Object(bo)) => {
                for (k, av) in ao.iter() {
                    let p = child(path, k);
                    if let Some(bv) = bo.get(k) {
                        if av == bv {
                            continue;
                        }
                        walk(av, bv, &p, out);
                    } else {
                        out.summary.adds += 1;
                        record(out, &p);
                    }
                }
                for (k, _bv) in bo.iter() {
                    if !ao.contains_key(k) {
                        out.summary.removes += 1;
                        record(out, &child(path, k));
                    }
                }
            }
            (V::Array(aa), V::Array(bb)) => {
                let min_len = aa.len().min(bb.len());
                for i in 0..min_len {
                    if aa[i] != bb[i] {
                        out.summary.updates += 1;
                        record(out, &format!("{}[{}]", path, i));
                    }
                }
                if aa.len() > bb.len() {
                    out.summary.adds += aa.len() - bb.len();
                    record(out, &format!("{}[{}..]", path, bb.len()));
                }
                if bb.len() > aa.len() {
                    out.summary.removes += bb.len() - aa.len();
                    record(out, &format!("{}[{}..]", path, aa.len()));
                }
            }
            // Scalars differ or type differs
            (av, bv) => {
                if av != bv {
                    out.summary.updates += 1;
                    record(out, if path.is_empty() { "." } else { path });
                }
            }
        }
    }

    let mut out = ResolvedDiff::default();
    walk(desired, current, "", &mut out);
    out
}
