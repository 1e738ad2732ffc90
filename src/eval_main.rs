use clap::Parser;

use rill::ast::{Script, Statement};
use rill::runtime::{execute, RuntimeContext};
use rill::{diagnostics, parse_expression_source, RillError};

#[derive(Parser)]
#[command(name = "rill-eval")]
#[command(about = "Evaluate a single Rill expression")]
#[command(version)]
struct Cli {
    /// The expression to evaluate
    expression: String,

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

    let expression = match parse_expression_source(&cli.expression) {
        Ok(expr) => expr,
        Err(e) => {
            report_error(&e, &cli);
            std::process::exit(1);
        }
    };

    let span = expression.span();
    let script = Script {
        statements: vec![Statement { expression, terminator: None, span }],
    };

    let mut ctx = RuntimeContext::empty();
    match execute(&script, &mut ctx).await {
        Ok(execution) => println!("{}", execution.value.render()),
        Err(e) => {
            report_error(&e, &cli);
            std::process::exit(1);
        }
    }
}

fn report_error(error: &RillError, cli: &Cli) {
    if cli.json {
        let diagnostic = diagnostics::to_json(error);
        eprintln!("{}", serde_json::to_string(&diagnostic).unwrap_or_default());
    } else {
        eprintln!("{}", diagnostics::human(error, Some(&cli.expression), cli.verbose));
    }
}
