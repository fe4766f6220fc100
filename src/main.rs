use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use builder::{Builder, BuilderConfig};

#[derive(Parser, Debug)]
#[command(name = "builder", about = "Expand directives and expressions in a text file")]
struct CliArgs {
    entry: PathBuf,

    #[arg(short = 'I', long = "include", action = clap::ArgAction::Append)]
    include_paths: Vec<PathBuf>,

    #[arg(long)]
    line_control: bool,

    #[arg(long)]
    allow_network: bool,

    #[arg(long = "net-allow", action = clap::ArgAction::Append)]
    net_allow: Vec<String>,

    #[arg(long = "cache-db")]
    cache_db: Option<PathBuf>,

    #[arg(long = "max-depth", default_value_t = 256)]
    max_depth: usize,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = CliArgs::parse();

    let source = match std::fs::read_to_string(&args.entry) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("builder: cannot read {}: {e}", args.entry.display());
            return ExitCode::FAILURE;
        }
    };

    let mut search_roots = Vec::new();
    if let Some(parent) = args.entry.parent() {
        search_roots.push(parent.to_path_buf());
    } else {
        search_roots.push(PathBuf::from("."));
    }
    search_roots.extend(args.include_paths);

    let config = BuilderConfig {
        search_roots,
        net: builder::config::NetConfig {
            enabled: args.allow_network,
            allowed_addresses: args.net_allow,
        },
        cache_db_path: args.cache_db,
        generate_line_control_statements: args.line_control,
        max_execution_depth: args.max_depth,
        ..BuilderConfig::default()
    };

    let mut engine = match Builder::new(config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("builder: {e}");
            return ExitCode::FAILURE;
        }
    };

    let file_name = args
        .entry
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.entry.to_string_lossy().to_string());

    match engine.execute(&file_name, &source, HashMap::new()) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("builder: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_include_flags_accumulate() {
        let args = CliArgs::parse_from(["builder", "entry.txt", "-I", "a", "-I", "b"]);
        assert_eq!(args.include_paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn defaults_are_conservative() {
        let args = CliArgs::parse_from(["builder", "entry.txt"]);
        assert!(!args.allow_network);
        assert!(!args.line_control);
        assert_eq!(args.max_depth, 256);
    }
}
