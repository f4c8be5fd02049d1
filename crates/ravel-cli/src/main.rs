use futures::executor::block_on;
use ravel::{Action, ActionOutcome, Engine, EngineOptions, NodeId, NodeTree, RavelConfig};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Ravel(ravel::Error),
    Json(serde_json::Error),
    UnknownNode(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Ravel(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::UnknownNode(name) => write!(f, "No node named {name:?}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ravel::Error> for CliError {
    fn from(value: ravel::Error) -> Self {
        Self::Ravel(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Snapshot,
    Apply,
    Diagnostics,
    Essentials,
    Deps,
    Cycles,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    pretty: bool,
    config: Option<String>,
    actions: Option<String>,
    restore: Option<String>,
    node: Option<String>,
    variable: Option<String>,
    extra: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyOut<'a> {
    outcomes: &'a [ActionOutcome],
    unsaved_changes: bool,
    essential_values: Value,
}

#[derive(Serialize)]
struct VarOut {
    node: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    variable: String,
}

#[derive(Serialize)]
struct DepsOut {
    dependencies: Vec<VarOut>,
    dependents: Vec<VarOut>,
}

fn usage() -> &'static str {
    "ravel-cli\n\
\n\
USAGE:\n\
  ravel-cli [snapshot] [--pretty] [--with <variable>]... [COMMON] [<tree.json>|-]\n\
  ravel-cli apply --actions <actions.json> [--pretty] [COMMON] [<tree.json>|-]\n\
  ravel-cli diagnostics [--pretty] [COMMON] [<tree.json>|-]\n\
  ravel-cli essentials [--pretty] [COMMON] [<tree.json>|-]\n\
  ravel-cli deps --node <name> --variable <variable> [--pretty] [COMMON] [<tree.json>|-]\n\
  ravel-cli cycles [--pretty] [COMMON] [<tree.json>|-]\n\
\n\
COMMON:\n\
  --config <overrides.json>   merge configuration overrides onto the defaults\n\
  --restore <values.json>     restore exported essential values before anything else\n\
  --actions <actions.json>    apply a JSON array of actions (in order) before printing\n\
\n\
NOTES:\n\
  - If <tree.json> is omitted or '-', the node tree is read from stdin.\n\
  - Logging goes to stderr and is controlled by RAVEL_LOG (default: warn).\n\
"
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "snapshot" => args.command = Command::Snapshot,
            "apply" => args.command = Command::Apply,
            "diagnostics" => args.command = Command::Diagnostics,
            "essentials" => args.command = Command::Essentials,
            "deps" => args.command = Command::Deps,
            "cycles" => args.command = Command::Cycles,
            "--pretty" => args.pretty = true,
            "--config" | "--actions" | "--restore" | "--node" | "--variable" | "--with" => {
                let Some(value) = it.next() else {
                    return Err(CliError::Usage(usage()));
                };
                let value = value.clone();
                match a.as_str() {
                    "--config" => args.config = Some(value),
                    "--actions" => args.actions = Some(value),
                    "--restore" => args.restore = Some(value),
                    "--node" => args.node = Some(value),
                    "--variable" => args.variable = Some(value),
                    _ => args.extra.push(value),
                }
            }
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    match args.command {
        Command::Apply if args.actions.is_none() => Err(CliError::Usage(usage())),
        Command::Deps if args.node.is_none() || args.variable.is_none() => {
            Err(CliError::Usage(usage()))
        }
        _ => Ok(args),
    }
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn read_json(path: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn write_json(value: &impl Serialize, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
    } else {
        serde_json::to_writer(std::io::stdout().lock(), value)?;
    }
    println!();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RAVEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_engine(args: &Args) -> Result<Engine, CliError> {
    let tree = NodeTree::from_json_str(&read_input(args.input.as_deref())?)?;
    let config = match &args.config {
        Some(path) => RavelConfig::from_json_overrides(&std::fs::read_to_string(path)?)?,
        None => RavelConfig::default(),
    };
    let mut engine = Engine::with_options(&tree, EngineOptions::default().with_config(config))?;
    if let Some(path) = &args.restore {
        engine.restore_essential_values(&read_json(path)?)?;
    }
    Ok(engine)
}

fn apply_script(engine: &mut Engine, path: &str) -> Result<Vec<ActionOutcome>, CliError> {
    let actions: Vec<Action> = serde_json::from_value(read_json(path)?)?;
    let mut outcomes = Vec::with_capacity(actions.len());
    for action in &actions {
        let outcome = block_on(engine.apply_action(action))?;
        if !outcome.success {
            tracing::info!(variable = %action.variable, "action rejected");
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn describe(engine: &Engine, vars: Vec<(NodeId, String)>) -> Vec<VarOut> {
    vars.into_iter()
        .map(|(node, variable)| VarOut {
            node,
            name: engine.node_name(node).map(str::to_string),
            variable,
        })
        .collect()
}

fn run(args: Args) -> Result<(), CliError> {
    let mut engine = build_engine(&args)?;
    let outcomes = match &args.actions {
        Some(path) => apply_script(&mut engine, path)?,
        None => Vec::new(),
    };

    match args.command {
        Command::Snapshot => {
            let extra: Vec<&str> = args.extra.iter().map(String::as_str).collect();
            write_json(&engine.snapshot_with(&extra), args.pretty)
        }
        Command::Apply => {
            let out = ApplyOut {
                outcomes: &outcomes,
                unsaved_changes: engine.has_unsaved_changes(),
                essential_values: engine.essential_values(),
            };
            write_json(&out, args.pretty)
        }
        Command::Diagnostics => write_json(&engine.diagnostics(), args.pretty),
        Command::Essentials => write_json(&engine.essential_values(), args.pretty),
        Command::Deps => {
            let (Some(name), Some(variable)) = (args.node.as_deref(), args.variable.as_deref())
            else {
                return Err(CliError::Usage(usage()));
            };
            let node = engine
                .node_id(name)
                .ok_or_else(|| CliError::UnknownNode(name.to_string()))?;
            // Introspection reports the graph as of the last evaluation.
            engine.value(node, variable)?;
            let out = DepsOut {
                dependencies: describe(&engine, engine.dependencies(node, variable)?),
                dependents: describe(&engine, engine.dependents(node, variable)?),
            };
            write_json(&out, args.pretty)
        }
        Command::Cycles => {
            let cycles: Vec<Vec<VarOut>> = engine
                .static_cycles()
                .into_iter()
                .map(|cycle| describe(&engine, cycle))
                .collect();
            write_json(&cycles, args.pretty)
        }
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    init_tracing();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("ravel-cli")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn snapshot_is_the_default_command() {
        let args = parse_args(&argv(&["--pretty", "tree.json"])).unwrap();
        assert!(matches!(args.command, Command::Snapshot));
        assert!(args.pretty);
        assert_eq!(args.input.as_deref(), Some("tree.json"));
    }

    #[test]
    fn repeated_with_flags_accumulate() {
        let args = parse_args(&argv(&["snapshot", "--with", "a", "--with", "b", "-"])).unwrap();
        assert_eq!(args.extra, vec!["a", "b"]);
        assert_eq!(args.input.as_deref(), Some("-"));
    }

    #[test]
    fn commands_check_their_required_flags() {
        assert!(matches!(
            parse_args(&argv(&["apply", "tree.json"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&argv(&["deps", "--node", "seg", "tree.json"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&argv(&["snapshot", "a.json", "b.json"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&argv(&["--unknown"])),
            Err(CliError::Usage(_))
        ));
    }
}
