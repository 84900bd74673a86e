//! `proxy-injector inject -f manifest.yaml`: runs the same decision/patch
//! pipeline the webhook uses, over a local manifest, with `Origin::Cli`
//! (`spec.md` §3, §6). There is no namespace to look up annotations from and
//! no cluster to resolve owners against, so both collapse to their simplest
//! case: cluster defaults only, and the object's own kind/name as its owner.

use std::collections::BTreeMap;
use std::io::Read;

use kube::core::DynamicObject;
use serde::de::Error as _;
use serde::Deserialize;

use proxy_injector_core::config::{merge, AnnotationOverrides, ClusterConfig};
use proxy_injector_core::decision::{decide, Action};
use proxy_injector_core::meta::{Origin, ParsedObject};
use proxy_injector_core::owner::RootOwner;
use proxy_injector_core::patch::build_pod_patch;
use proxy_injector_core::synth::synthesize;

use crate::cli::InjectArgs;
use crate::error::{Error, Result};

pub fn run(args: &InjectArgs, cluster: &ClusterConfig, injector_version: &str) -> Result<()> {
    let raw = read_input(args)?;

    let mut out_docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&raw) {
        let value = serde_yaml::Value::deserialize(document)?;
        if matches!(value, serde_yaml::Value::Null) {
            continue;
        }
        out_docs.push(inject_one(value, cluster, injector_version)?);
    }

    let stdout = std::io::stdout();
    serde_yaml::to_writer(stdout.lock(), &out_docs).map_err(Error::ParseManifest)
}

fn read_input(args: &InjectArgs) -> Result<String> {
    if args.filename.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|err| Error::ReadManifest("<stdin>".to_string(), err))?;
        Ok(buf)
    } else {
        std::fs::read_to_string(&args.filename)
            .map_err(|err| Error::ReadManifest(args.filename.display().to_string(), err))
    }
}

fn inject_one(value: serde_yaml::Value, cluster: &ClusterConfig, injector_version: &str) -> Result<serde_yaml::Value> {
    let object: DynamicObject = serde_yaml::from_value(value.clone())?;
    let parsed = ParsedObject::parse(Origin::Cli, object)?;

    let (wl_from_map, _warnings) = AnnotationOverrides::from_map(&parsed.template_annotations());
    let (ns_from_map, _) = AnnotationOverrides::from_map(&BTreeMap::new());
    let named_ports = parsed.named_container_ports();
    let (effective, _port_warnings) = merge(cluster, &ns_from_map, &wl_from_map, &named_ports);

    let decision = decide(&parsed, &effective, None, None);
    if decision.action != Action::Inject {
        return Ok(value);
    }

    let owner = RootOwner {
        kind: parsed.kind.as_str().to_string(),
        name: parsed.name.clone(),
    };

    let resources = synthesize(&parsed, cluster, &effective)?;
    let patch = build_pod_patch(&parsed, cluster, &effective, &resources, &owner, injector_version)?;

    let mut full = serde_json::to_value(&parsed.object).map_err(proxy_injector_core::CoreError::PatchSerialize)?;
    json_patch::patch(&mut full, &patch)
        .map_err(|err| Error::ParseManifest(serde_yaml::Error::custom(err.to_string())))?;

    Ok(serde_yaml::to_value(full)?)
}
