//! Parsing a submitted YAML manifest into a [`SubmittedResource`].
//!
//! Manifest shape:
//!
//! ```yaml
//! apiVersion: ec2/v1
//! kind: Cluster
//! metadata:
//!   name: fnord-frontend
//!   account: prod
//!   application: fnord
//! spec: { ... }
//! ```

use anyhow::{anyhow, Context, Result};
use serde_json::Value as Json;

use steward_core::{ResourceKind, SubmittedResource};

fn max_manifest_bytes() -> usize {
    std::env::var("STEWARD_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn max_manifest_nodes() -> usize {
    std::env::var("STEWARD_MAX_MANIFEST_NODES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(100_000)
}

fn json_node_budget_exceeded(v: &Json, max: usize) -> bool {
    // Fast precheck: keep a running counter and bail early when exceeding max
    fn walk(v: &Json, cur: &mut usize, max: usize) {
        if *cur >= max {
            return;
        }
        *cur += 1;
        match v {
            Json::Object(map) => {
                for (_k, vv) in map.iter() {
                    if *cur >= max {
                        break;
                    }
                    walk(vv, cur, max);
                }
            }
            Json::Array(arr) => {
                for vv in arr.iter() {
                    if *cur >= max {
                        break;
                    }
                    walk(vv, cur, max);
                }
            }
            _ => {}
        }
    }
    let mut count = 0usize;
    walk(v, &mut count, max);
    count >= max
}

fn meta_str<'a>(json: &'a Json, field: &str) -> Option<&'a str> {
    json.get("metadata").and_then(|m| m.get(field)).and_then(|v| v.as_str())
}

/// Parse one YAML manifest into a submission. The spec payload stays raw; the
/// registry's bound decoder gives it a typed shape later.
pub fn parse_submitted(yaml: &str) -> Result<SubmittedResource> {
    if yaml.len() > max_manifest_bytes() {
        return Err(anyhow!("manifest too large (>{} bytes)", max_manifest_bytes()));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(yaml).context("parsing YAML")?;
    let json = serde_json::to_value(val).context("converting YAML to JSON")?;
    if json_node_budget_exceeded(&json, max_manifest_nodes()) {
        return Err(anyhow!("manifest too complex (>{} nodes)", max_manifest_nodes()));
    }

    let api_version = json
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing apiVersion"))?;
    let kind = json
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing kind"))?;
    let name =
        meta_str(&json, "name").ok_or_else(|| anyhow!("manifest missing metadata.name"))?;
    let account =
        meta_str(&json, "account").ok_or_else(|| anyhow!("manifest missing metadata.account"))?;
    let application = meta_str(&json, "application")
        .ok_or_else(|| anyhow!("manifest missing metadata.application"))?;
    let spec = json.get("spec").cloned().ok_or_else(|| anyhow!("manifest missing spec"))?;

    Ok(SubmittedResource {
        kind: ResourceKind::new(api_version, kind),
        name: name.to_string(),
        account: account.to_string(),
        application: application.to_string(),
        spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
apiVersion: ec2/v1
kind: Cluster
metadata:
  name: fnord-frontend
  account: prod
  application: fnord
spec:
  region: eu-west-1
  capacity: 3
";

    #[test]
    fn parses_a_full_manifest() {
        let sub = parse_submitted(MANIFEST).unwrap();
        assert_eq!(sub.kind.key(), "ec2/v1/Cluster");
        assert_eq!(sub.name, "fnord-frontend");
        assert_eq!(sub.account, "prod");
        assert_eq!(sub.application, "fnord");
        assert_eq!(sub.spec["capacity"], 3);
    }

    #[test]
    fn field_errors_are_friendly() {
        let e = parse_submitted("kind: Foo\nmetadata:\n  name: x\n").unwrap_err().to_string();
        assert!(e.contains("missing apiVersion"), "e={e}");

        let e = parse_submitted("apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err().to_string();
        assert!(e.contains("missing kind"), "e={e}");

        let e = parse_submitted("apiVersion: v1\nkind: Cluster\nmetadata: {}\n")
            .unwrap_err()
            .to_string();
        assert!(e.contains("missing metadata.name"), "e={e}");

        let e = parse_submitted(
            "apiVersion: v1\nkind: Cluster\nmetadata:\n  name: x\n  account: a\n  application: b\n",
        )
        .unwrap_err()
        .to_string();
        assert!(e.contains("missing spec"), "e={e}");
    }

    #[test]
    fn oversized_manifests_are_refused() {
        let huge = format!("{}\n# {}", MANIFEST, "x".repeat(2_000_000));
        let e = parse_submitted(&huge).unwrap_err().to_string();
        assert!(e.contains("too large"), "e={e}");
    }
}
