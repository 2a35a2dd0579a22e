use clap::Parser;
use std::io::{IsTerminal, Read};

use minibash::Bash;

#[derive(Parser)]
#[command(name = "minibash")]
#[command(about = "An interpreter for a practical subset of the POSIX shell command language")]
#[command(version)]
struct Cli {
    /// Script file to execute. With no file and a non-terminal stdin,
    /// reads the script from stdin instead.
    #[arg()]
    script: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut shell = Bash::new();

    let exit_code = if let Some(path) = cli.script {
        match std::fs::read_to_string(&path) {
            Ok(source) => run_or_die(&mut shell, &source),
            Err(err) => {
                eprintln!("minibash: cannot read {path}: {err}");
                1
            }
        }
    } else if std::io::stdin().is_terminal() {
        run_repl(&mut shell)
    } else {
        let mut source = String::new();
        let _ = std::io::stdin().read_to_string(&mut source);
        run_or_die(&mut shell, &source)
    };

    std::process::exit(exit_code);
}

/// Line-oriented interactive prompt (§6.1): each line is evaluated as its
/// own complete script, with shell state carried over between lines.
fn run_repl(shell: &mut Bash) -> i32 {
    let mut editor =
        rustyline::DefaultEditor::new().expect("failed to initialize line editor");
    loop {
        match editor.readline("minibash> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if let Err(err) = shell.exec(&line) {
                    eprintln!("{err}");
                    return 1;
                }
            }
            Err(rustyline::error::ReadlineError::Eof)
            | Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(_) => break,
        }
    }
    shell.last_status()
}

/// Run a complete, non-interactive script. The one `Err` case `exec` can
/// return is §7's fatal invariant violation — not a script error to
/// recover from, so it's reported and the process exits rather than
/// folding it into an ordinary status code.
fn run_or_die(shell: &mut Bash, source: &str) -> i32 {
    match shell.exec(source) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}
