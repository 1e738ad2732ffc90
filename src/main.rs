use clap::Parser;
use std::io::Read;

use rill::runtime::{ContextOptions, RuntimeContext, Value};
use rill::{diagnostics, execute_source, RillError};

#[derive(Parser)]
#[command(name = "rill")]
#[command(about = "Execute a Rill script from a file or stdin")]
#[command(version)]
struct Cli {
    /// Script file to execute (stdin when omitted)
    #[arg()]
    script_file: Option<String>,

    /// Positional arguments surfaced to the script as `$`
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Output errors as LSP-compatible JSON diagnostics
    #[arg(long = "json")]
    json: bool,

    /// Include documentation links in error output
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let source = match &cli.script_file {
        Some(file) => match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("error: cannot read script file {}: {}", file, e);
                std::process::exit(1);
            }
        },
        None => {
            use std::io::IsTerminal;
            if std::io::stdin().is_terminal() {
                eprintln!("error: no script provided; pass a file or pipe via stdin");
                std::process::exit(1);
            }
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
            buf
        }
    };

    if source.trim().is_empty() {
        std::process::exit(0);
    }

    let mut ctx = match RuntimeContext::new(ContextOptions::default()) {
        Ok(ctx) => ctx,
        Err(e) => {
            report_error(&e, &source, &cli);
            std::process::exit(1);
        }
    };
    if !cli.args.is_empty() {
        ctx.set_pipe_value(Value::List(
            cli.args.iter().map(Value::string).collect(),
        ));
    }

    match execute_source(&source, &mut ctx).await {
        Ok(execution) => {
            println!("{}", execution.value.render());
        }
        Err(e) => {
            report_error(&e, &source, &cli);
            ctx.dispose().await;
            std::process::exit(1);
        }
    }
    ctx.dispose().await;
}

fn report_error(error: &RillError, source: &str, cli: &Cli) {
    if cli.json {
        let diagnostic = diagnostics::to_json(error);
        eprintln!("{}", serde_json::to_string(&diagnostic).unwrap_or_default());
    } else {
        eprintln!("{}", diagnostics::human(error, Some(source), cli.verbose));
    }
}
