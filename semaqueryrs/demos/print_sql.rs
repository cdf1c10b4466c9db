use std::{env, fs, path::PathBuf};

use anyhow::Context;
use semaquery::{telemetry, DefinitionRegistry, QueryCompiler, QueryRequest, SemaqueryConfig};

fn usage() {
    eprintln!("Usage: print_sql <definitions_dir> <request_json> [--artifact]");
    eprintln!(
        "Example: cargo run --example print_sql -- demos/definitions demos/requests/revenue_by_month.json"
    );
}

struct Args {
    definitions_dir: PathBuf,
    request_path: PathBuf,
    show_artifact: bool,
}

fn parse_args(mut args: Vec<String>) -> Option<Args> {
    let show_artifact = args.iter().any(|a| a == "--artifact");
    args.retain(|a| a != "--artifact");
    match args.as_slice() {
        [definitions_dir, request_path] => Some(Args {
            definitions_dir: PathBuf::from(definitions_dir),
            request_path: PathBuf::from(request_path),
            show_artifact,
        }),
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let Some(Args {
        definitions_dir,
        request_path,
        show_artifact,
    }) = parse_args(env::args().skip(1).collect())
    else {
        usage();
        std::process::exit(1);
    };

    let config = SemaqueryConfig::load_default();
    let registry = DefinitionRegistry::load_from_dir(&definitions_dir)
        .with_context(|| format!("loading definitions from {}", definitions_dir.display()))?;
    let request_str = fs::read_to_string(&request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let request: QueryRequest = serde_json::from_str(&request_str)?;

    let parts = QueryCompiler::from_config(&config).compile(&registry, &request)?;
    if show_artifact {
        println!("{}", serde_json::to_string_pretty(&parts)?);
    } else {
        println!("{}", parts.generated_sql);
        for item in parts
            .incompatible_metrics
            .iter()
            .chain(&parts.incompatible_dimensions)
        {
            eprintln!("skipped {}: {}", item.name, item.reason);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn artifact_flag_does_not_count_as_a_path() {
        assert!(parse_args(args(&["defs", "--artifact"])).is_none());
        assert!(parse_args(args(&["defs"])).is_none());

        let parsed = parse_args(args(&["--artifact", "defs", "req.json"])).unwrap();
        assert!(parsed.show_artifact);
        assert_eq!(parsed.definitions_dir, PathBuf::from("defs"));
        assert_eq!(parsed.request_path, PathBuf::from("req.json"));

        let parsed = parse_args(args(&["defs", "req.json"])).unwrap();
        assert!(!parsed.show_artifact);
    }
}
